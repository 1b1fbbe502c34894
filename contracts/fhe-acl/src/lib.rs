#![no_std]

//! # FHE Access Control List
//!
//! Append-only set of `(handle, account)` grants. A grant means `account`
//! may ask the decryption oracle for the cleartext behind `handle`, and may
//! use `handle` as an operand when it calls the executor.
//!
//! ## Who can grant
//! - The configured executor, for handles it has just produced.
//! - Any account that already holds a grant on the handle (it can share
//!   what it owns, nothing else).
//!
//! Grants are never revoked.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error,
    Address, BytesN, Env,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataKey {
    Admin,
    /// Executor contract allowed to grant freshly computed handles
    Executor,
    /// Grant: DataKey::Grant(handle, account) → true
    Grant(BytesN<32>, Address),
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum AclError {
    AdminNotSet = 1,
    ExecutorNotSet = 2,
    SenderNotAllowed = 3,
    SentinelHandle = 4,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvAllowed {
    pub handle: BytesN<32>,
    pub account: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// The reserved "no value" handle. Never grantable.
pub const SENTINEL_HANDLE: [u8; 32] = [0u8; 32];

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Grants outlive any single game: 120 days
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60; // 10,368,000 seconds

/// TTL for grant entries in ledgers: 2,073,600 ledgers
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct FheAcl;

#[contractimpl]
impl FheAcl {
    pub fn __constructor(env: Env, admin: Address) {
        env.storage().instance().set(&DataKey::Admin, &admin);
    }

    /// Point the ACL at the executor whose results it should accept grants for.
    pub fn set_executor(env: Env, executor: Address) -> Result<(), AclError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&DataKey::Executor, &executor);
        Ok(())
    }

    pub fn get_executor(env: Env) -> Result<Address, AclError> {
        env.storage()
            .instance()
            .get(&DataKey::Executor)
            .ok_or(AclError::ExecutorNotSet)
    }

    pub fn get_admin(env: Env) -> Result<Address, AclError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), AclError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &new_admin);
        Ok(())
    }

    /// Grant `account` access to `handle`. Idempotent.
    ///
    /// `sender` must be the executor or already hold `handle`.
    pub fn allow(env: Env, sender: Address, handle: BytesN<32>, account: Address) {
        sender.require_auth();

        if handle.to_array() == SENTINEL_HANDLE {
            panic_with_error!(&env, AclError::SentinelHandle);
        }

        let executor: Address = env
            .storage()
            .instance()
            .get(&DataKey::Executor)
            .unwrap_or_else(|| panic_with_error!(&env, AclError::ExecutorNotSet));
        if sender != executor && !Self::has_grant(&env, &handle, &sender) {
            panic_with_error!(&env, AclError::SenderNotAllowed);
        }

        if Self::has_grant(&env, &handle, &account) {
            return;
        }

        let key = DataKey::Grant(handle.clone(), account.clone());
        env.storage().persistent().set(&key, &true);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
        env.storage().instance().extend_ttl(TTL_LEDGERS, TTL_LEDGERS);

        EvAllowed { handle, account }.publish(&env);
    }

    /// Pure query used by the decryption oracle and the executor.
    pub fn is_allowed(env: Env, handle: BytesN<32>, account: Address) -> bool {
        Self::has_grant(&env, &handle, &account)
    }

    // ─── Internal helpers ──────────────────────────────────────────────────

    fn has_grant(env: &Env, handle: &BytesN<32>, account: &Address) -> bool {
        env.storage()
            .persistent()
            .has(&DataKey::Grant(handle.clone(), account.clone()))
    }

    fn load_admin(env: &Env) -> Result<Address, AclError> {
        env.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(AclError::AdminNotSet)
    }
}
