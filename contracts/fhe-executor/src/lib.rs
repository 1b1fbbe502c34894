#![no_std]

//! # FHE Executor (plaintext-simulating backend)
//!
//! Arithmetic engine over opaque ciphertext handles. Callers never see
//! values, only 32-byte handles; every operation produces a new handle and
//! grants it to the calling contract through the ACL.
//!
//! | Op | Entry point       | Result                       | Result type |
//! |----|-------------------|------------------------------|-------------|
//! | 1  | `trivial_encrypt` | constant known to the caller | U32         |
//! | 2  | `ingest`          | verified client input        | input type  |
//! | 3  | `equal`           | `a == b`                     | BOOL        |
//! | 4  | `accumulate_and`  | `a * b` over 0/1 values      | BOOL        |
//! | 5  | `select_add`      | `base + flag * bonus`        | U32         |
//!
//! This backend keeps the cleartext next to each handle so that
//! `user_decrypt` can stand in for the off-ledger decryption oracle on local
//! networks and in tests. Anyone reading ledger storage can recover those
//! values. A production deployment points its game contracts at a
//! coprocessor contract exposing the same interface.
//!
//! ## Handles
//! ```text
//! handle = keccak256("FHEH" || op_be4 || fhe_type_be4 || caller || operands)
//! ```
//! Operands are the operand handles in order (or `value_be4` for op 1).
//! The all-zero handle is reserved as the "unset" sentinel and is never an
//! operand.
//!
//! ## Input proofs
//!
//! **Proof layout:**
//! ```text
//! [0..1)    fhe_type   : 0 = BOOL, 4 = U32
//! [1..5)    ciphertext : u32 big-endian
//! [5..37)   blinding   : 32 bytes chosen by the client
//! ```
//!
//! **Binding:**
//! ```text
//! input = keccak256("FHEI" || fhe_type || ciphertext || blinding || contract || submitter || context)
//! ```
//! The caller names the type it expects; a proof of any other type is
//! rejected before its handle is registered.
//! `contract` is the calling contract, `submitter` the account that
//! encrypted the value and `context` whatever the caller scopes inputs to
//! (the game uses the step index). An input captured for one submitter,
//! contract or context fails the binding check anywhere else.

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, contracttype,
    panic_with_error, Address, Bytes, BytesN, Env,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  External trait interfaces
// ═══════════════════════════════════════════════════════════════════════════════

#[contractclient(name = "AclClient")]
pub trait AccessControl {
    fn allow(env: Env, sender: Address, handle: BytesN<32>, account: Address);
    fn is_allowed(env: Env, handle: BytesN<32>, account: Address) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Error codes
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ExecutorError {
    AdminNotSet = 1,
    AclNotSet = 2,
    UnknownHandle = 3,
    SentinelHandle = 4,
    TypeMismatch = 5,
    NotAllowed = 6,
    // Input proof rejections
    ProofWrongLength = 10,
    UnsupportedType = 11,
    ValueOutOfRange = 12,
    BindingMismatch = 13,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvInputAccepted {
    pub submitter: Address,
    pub handle: BytesN<32>,
}

#[contractevent]
pub struct EvInputRejected {
    pub reason: u32,
}

#[contractevent]
pub struct EvComputed {
    pub op: u32,
    pub result: BytesN<32>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Encrypted types & opcodes
// ═══════════════════════════════════════════════════════════════════════════════

pub const FHE_BOOL: u32 = 0;
pub const FHE_U32: u32 = 4;

pub const OP_TRIVIAL: u32 = 1;
pub const OP_INPUT: u32 = 2;
pub const OP_EQUAL: u32 = 3;
pub const OP_AND: u32 = 4;
pub const OP_SELECT_ADD: u32 = 5;

/// Domain separator for computed handles: ASCII "FHEH"
const HANDLE_TAG: [u8; 4] = [0x46, 0x48, 0x45, 0x48];

/// Domain separator for client input handles: ASCII "FHEI"
pub const INPUT_TAG: [u8; 4] = [0x46, 0x48, 0x45, 0x49];

/// fhe_type(1) + ciphertext(4) + blinding(32)
pub const INPUT_PROOF_LEN: u32 = 37;

pub const SENTINEL_HANDLE: [u8; 32] = [0u8; 32];

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Storage
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ciphertext {
    pub fhe_type: u32,
    pub value: u32,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Admin,
    AclAddress,
    Ciphertext(BytesN<32>),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct FheExecutor;

#[contractimpl]
impl FheExecutor {
    pub fn __constructor(env: Env, admin: Address, acl: Address) {
        env.storage().instance().set(&StorageKey::Admin, &admin);
        env.storage().instance().set(&StorageKey::AclAddress, &acl);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Handle production
    // ───────────────────────────────────────────────────────────────────────────

    /// Encrypt a constant the caller already knows in the clear.
    pub fn trivial_encrypt(env: Env, caller: Address, value: u32) -> BytesN<32> {
        caller.require_auth();

        let operands = Bytes::from_array(&env, &value.to_be_bytes());
        let handle = Self::derive_handle(&env, OP_TRIVIAL, FHE_U32, &caller, &operands);
        Self::commit_result(
            &env,
            &caller,
            OP_TRIVIAL,
            &handle,
            &Ciphertext { fhe_type: FHE_U32, value },
        );
        handle
    }

    /// Verify a client-encrypted input and register its handle.
    ///
    /// Returns `None` if the proof does not certify `input` for
    /// `(caller, submitter, context)`, or if it carries a type other than
    /// `expected_type`. Nothing is stored in that case.
    pub fn ingest(
        env: Env,
        caller: Address,
        input: BytesN<32>,
        proof: Bytes,
        expected_type: u32,
        submitter: Address,
        context: Bytes,
    ) -> Option<BytesN<32>> {
        caller.require_auth();

        match Self::verify_input(
            &env,
            &caller,
            &input,
            &proof,
            expected_type,
            &submitter,
            &context,
        ) {
            Ok(ciphertext) => {
                Self::commit_result(&env, &caller, OP_INPUT, &input, &ciphertext);
                EvInputAccepted {
                    submitter,
                    handle: input.clone(),
                }
                .publish(&env);
                Some(input)
            }
            Err(reason) => {
                EvInputRejected {
                    reason: reason as u32,
                }
                .publish(&env);
                None
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Homomorphic operations
    // ───────────────────────────────────────────────────────────────────────────

    /// Encrypted `lhs == rhs` as a BOOL handle.
    pub fn equal(env: Env, caller: Address, lhs: BytesN<32>, rhs: BytesN<32>) -> BytesN<32> {
        caller.require_auth();

        let a = Self::load_operand(&env, &caller, &lhs);
        let b = Self::load_operand(&env, &caller, &rhs);
        if a.fhe_type != b.fhe_type {
            panic_with_error!(&env, ExecutorError::TypeMismatch);
        }

        let handle = Self::derive_handle(
            &env,
            OP_EQUAL,
            FHE_BOOL,
            &caller,
            &Self::concat_handles(&env, &[&lhs, &rhs]),
        );
        let result = Ciphertext {
            fhe_type: FHE_BOOL,
            value: u32::from(a.value == b.value),
        };
        Self::commit_result(&env, &caller, OP_EQUAL, &handle, &result);
        handle
    }

    /// Logical AND of two BOOL handles, realised as their product.
    pub fn accumulate_and(
        env: Env,
        caller: Address,
        prior: BytesN<32>,
        next: BytesN<32>,
    ) -> BytesN<32> {
        caller.require_auth();

        let a = Self::load_operand(&env, &caller, &prior);
        let b = Self::load_operand(&env, &caller, &next);
        Self::require_type(&env, &a, FHE_BOOL);
        Self::require_type(&env, &b, FHE_BOOL);

        let handle = Self::derive_handle(
            &env,
            OP_AND,
            FHE_BOOL,
            &caller,
            &Self::concat_handles(&env, &[&prior, &next]),
        );
        let result = Ciphertext {
            fhe_type: FHE_BOOL,
            value: a.value.wrapping_mul(b.value),
        };
        Self::commit_result(&env, &caller, OP_AND, &handle, &result);
        handle
    }

    /// `base + flag * bonus` with wrapping u32 arithmetic.
    ///
    /// `flag` must be a BOOL handle; `base` and `bonus` must be U32.
    pub fn select_add(
        env: Env,
        caller: Address,
        base: BytesN<32>,
        flag: BytesN<32>,
        bonus: BytesN<32>,
    ) -> BytesN<32> {
        caller.require_auth();

        let b = Self::load_operand(&env, &caller, &base);
        let f = Self::load_operand(&env, &caller, &flag);
        let k = Self::load_operand(&env, &caller, &bonus);
        Self::require_type(&env, &b, FHE_U32);
        Self::require_type(&env, &f, FHE_BOOL);
        Self::require_type(&env, &k, FHE_U32);

        let handle = Self::derive_handle(
            &env,
            OP_SELECT_ADD,
            FHE_U32,
            &caller,
            &Self::concat_handles(&env, &[&base, &flag, &bonus]),
        );
        let result = Ciphertext {
            fhe_type: FHE_U32,
            value: b.value.wrapping_add(f.value.wrapping_mul(k.value)),
        };
        Self::commit_result(&env, &caller, OP_SELECT_ADD, &handle, &result);
        handle
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Decryption oracle stand-in
    // ───────────────────────────────────────────────────────────────────────────

    /// Reveal the cleartext behind `handle` to `requester`.
    ///
    /// Only succeeds if the ACL holds a grant for `(handle, requester)`.
    pub fn user_decrypt(
        env: Env,
        requester: Address,
        handle: BytesN<32>,
    ) -> Result<u32, ExecutorError> {
        requester.require_auth();

        if handle.to_array() == SENTINEL_HANDLE {
            return Err(ExecutorError::SentinelHandle);
        }
        let acl = AclClient::new(&env, &Self::load_acl(&env)?);
        if !acl.is_allowed(&handle, &requester) {
            return Err(ExecutorError::NotAllowed);
        }
        let ciphertext = Self::read_ciphertext(&env, &handle).ok_or(ExecutorError::UnknownHandle)?;
        Ok(ciphertext.value)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, ExecutorError> {
        Self::load_admin(&env)
    }

    pub fn get_acl(env: Env) -> Result<Address, ExecutorError> {
        Self::load_acl(&env)
    }

    pub fn set_acl(env: Env, new_acl: Address) -> Result<(), ExecutorError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::AclAddress, &new_acl);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Input verification
    // ═══════════════════════════════════════════════════════════════════════════

    fn verify_input(
        env: &Env,
        caller: &Address,
        input: &BytesN<32>,
        proof: &Bytes,
        expected_type: u32,
        submitter: &Address,
        context: &Bytes,
    ) -> Result<Ciphertext, ExecutorError> {
        if proof.len() != INPUT_PROOF_LEN {
            return Err(ExecutorError::ProofWrongLength);
        }

        let fhe_type = proof.get(0).unwrap_or(u8::MAX) as u32;
        let mut value_be = [0u8; 4];
        proof.slice(1..5).copy_into_slice(&mut value_be);
        let value = u32::from_be_bytes(value_be);

        match fhe_type {
            FHE_BOOL if value > 1 => return Err(ExecutorError::ValueOutOfRange),
            FHE_BOOL | FHE_U32 => {}
            _ => return Err(ExecutorError::UnsupportedType),
        }
        if fhe_type != expected_type {
            return Err(ExecutorError::TypeMismatch);
        }

        let expected = input_handle(env, caller, submitter, context, proof);
        if expected != *input {
            return Err(ExecutorError::BindingMismatch);
        }

        Ok(Ciphertext { fhe_type, value })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Handles & storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn derive_handle(
        env: &Env,
        op: u32,
        fhe_type: u32,
        caller: &Address,
        operands: &Bytes,
    ) -> BytesN<32> {
        let mut preimage = Bytes::from_array(env, &HANDLE_TAG);
        preimage.append(&Bytes::from_array(env, &op.to_be_bytes()));
        preimage.append(&Bytes::from_array(env, &fhe_type.to_be_bytes()));
        preimage.append(&caller.to_string().to_bytes());
        preimage.append(operands);
        env.crypto().keccak256(&preimage).into()
    }

    fn concat_handles(env: &Env, handles: &[&BytesN<32>]) -> Bytes {
        let mut out = Bytes::new(env);
        for h in handles {
            out.append(&Bytes::from_array(env, &h.to_array()));
        }
        out
    }

    /// Resolve an operand the caller is entitled to use.
    fn load_operand(env: &Env, caller: &Address, handle: &BytesN<32>) -> Ciphertext {
        if handle.to_array() == SENTINEL_HANDLE {
            panic_with_error!(env, ExecutorError::SentinelHandle);
        }
        let acl_addr = Self::load_acl(env).unwrap_or_else(|e| panic_with_error!(env, e));
        if !AclClient::new(env, &acl_addr).is_allowed(handle, caller) {
            panic_with_error!(env, ExecutorError::NotAllowed);
        }
        Self::read_ciphertext(env, handle)
            .unwrap_or_else(|| panic_with_error!(env, ExecutorError::UnknownHandle))
    }

    fn require_type(env: &Env, ciphertext: &Ciphertext, fhe_type: u32) {
        if ciphertext.fhe_type != fhe_type {
            panic_with_error!(env, ExecutorError::TypeMismatch);
        }
    }

    /// Store a result and hand it to the caller.
    fn commit_result(
        env: &Env,
        caller: &Address,
        op: u32,
        handle: &BytesN<32>,
        ciphertext: &Ciphertext,
    ) {
        let key = StorageKey::Ciphertext(handle.clone());
        env.storage().persistent().set(&key, ciphertext);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
        env.storage().instance().extend_ttl(TTL_LEDGERS, TTL_LEDGERS);

        let acl_addr = Self::load_acl(env).unwrap_or_else(|e| panic_with_error!(env, e));
        AclClient::new(env, &acl_addr).allow(&env.current_contract_address(), handle, caller);

        EvComputed {
            op,
            result: handle.clone(),
        }
        .publish(env);
    }

    fn read_ciphertext(env: &Env, handle: &BytesN<32>) -> Option<Ciphertext> {
        env.storage()
            .persistent()
            .get(&StorageKey::Ciphertext(handle.clone()))
    }

    fn load_admin(env: &Env) -> Result<Address, ExecutorError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(ExecutorError::AdminNotSet)
    }

    fn load_acl(env: &Env) -> Result<Address, ExecutorError> {
        env.storage()
            .instance()
            .get(&StorageKey::AclAddress)
            .ok_or(ExecutorError::AclNotSet)
    }
}

/// Input handle a client must present for `proof` under `(contract, submitter, context)`.
pub fn input_handle(
    env: &Env,
    contract: &Address,
    submitter: &Address,
    context: &Bytes,
    proof: &Bytes,
) -> BytesN<32> {
    let mut preimage = Bytes::from_array(env, &INPUT_TAG);
    preimage.append(proof);
    preimage.append(&contract.to_string().to_bytes());
    preimage.append(&submitter.to_string().to_bytes());
    preimage.append(context);
    env.crypto().keccak256(&preimage).into()
}

/// Client-side encryption for the simulating backend.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::{input_handle, INPUT_PROOF_LEN};
    use soroban_sdk::{Address, Bytes, BytesN, Env};

    /// Produce `(input_handle, proof)` for `value`, bound to the target
    /// contract, the submitting account and `context`.
    pub fn encrypt_input(
        env: &Env,
        contract: &Address,
        submitter: &Address,
        context: &Bytes,
        fhe_type: u32,
        value: u32,
        blinding: &BytesN<32>,
    ) -> (BytesN<32>, Bytes) {
        let mut proof = Bytes::new(env);
        proof.push_back(fhe_type as u8);
        proof.append(&Bytes::from_array(env, &value.to_be_bytes()));
        proof.append(&Bytes::from_array(env, &blinding.to_array()));
        debug_assert_eq!(proof.len(), INPUT_PROOF_LEN);

        let handle = input_handle(env, contract, submitter, context, &proof);
        (handle, proof)
    }
}
