//! Per-player game records.
//!
//! Absent players read as [`PlayerState::empty`], so callers never need an
//! existence check. Records are only ever replaced whole.

use soroban_sdk::{contracttype, Address, BytesN, Env, Vec};

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Player records persist indefinitely; keep them alive for 120 days per write
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60; // 10,368,000 seconds

/// TTL for player storage in ledgers: 120 * 24 * 60 * 60 / 5 = 2,073,600 ledgers
pub(crate) const PLAYER_TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerState {
    pub steps_submitted: u32,
    pub finished: bool,
    pub score: Option<BytesN<32>>,
    pub outcome: Option<BytesN<32>>,
    /// Accepted choice handles in step order; `len() == steps_submitted`
    pub choices: Vec<BytesN<32>>,
    /// Running AND of the per-step matches. Dropped once the outcome is set.
    pub path_match: Option<BytesN<32>>,
}

impl PlayerState {
    /// The record of a player that never called `start_game`.
    pub fn empty(env: &Env) -> Self {
        PlayerState {
            steps_submitted: 0,
            finished: false,
            score: None,
            outcome: None,
            choices: Vec::new(env),
            path_match: None,
        }
    }

    /// A fresh run holding only the starting score.
    pub fn started(env: &Env, score: BytesN<32>) -> Self {
        PlayerState {
            score: Some(score),
            ..Self::empty(env)
        }
    }

    pub fn is_started(&self) -> bool {
        self.score.is_some()
    }
}

#[contracttype]
#[derive(Clone)]
pub(crate) enum StorageKey {
    Admin,
    ExecutorAddress,
    AclAddress,
    Player(Address),
}

pub(crate) fn load_player(env: &Env, player: &Address) -> PlayerState {
    env.storage()
        .persistent()
        .get(&StorageKey::Player(player.clone()))
        .unwrap_or_else(|| PlayerState::empty(env))
}

pub(crate) fn save_player(env: &Env, player: &Address, state: &PlayerState) {
    let key = StorageKey::Player(player.clone());
    env.storage().persistent().set(&key, state);
    env.storage()
        .persistent()
        .extend_ttl(&key, PLAYER_TTL_LEDGERS, PLAYER_TTL_LEDGERS);
    // Keep instance storage (admin, executor, acl addresses) alive
    env.storage()
        .instance()
        .extend_ttl(PLAYER_TTL_LEDGERS, PLAYER_TTL_LEDGERS);
}
