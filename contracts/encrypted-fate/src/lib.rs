#![no_std]

//! # Encrypted Fate
//!
//! A single-player path game whose whole state is encrypted. Each player
//! walks four steps, choosing a path value at every step. Choices, the
//! match outcome and the score live on-ledger only as ciphertext handles
//! held by an FHE executor contract; this contract never sees a cleartext.
//!
//! ## Game flow
//! 1. `start_game` sets the score to an encryption of 1000 and clears the run.
//! 2. `submit_path_choice` is called for steps 0, 1, 2, 3 in order. Each
//!    call ingests a client-encrypted choice, compares it with the hidden
//!    target value for that step and folds the result into a running flag:
//!    `match = eq(c0, t0) * eq(c1, t1) * eq(c2, t2) * eq(c3, t3)`.
//! 3. On the last step the bonus is paid without branching:
//!    `score = score + match * 1000`. `match` becomes the outcome.
//!
//! ## Decryption rights
//! Every handle a getter can return to a player (score, outcome, choices)
//! is granted to that player in the ACL within the transition that
//! produced it. The off-ledger oracle only decrypts granted handles.
//!
//! ## Restart
//! `start_game` always resets the caller's run, finished or not.

mod store;

use store::{PlayerState, StorageKey};

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, Address, Bytes, BytesN,
    Env,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvGameStarted {
    pub player: Address,
    pub restarted: bool,
}

#[contractevent]
pub struct EvChoiceSubmitted {
    pub player: Address,
    pub step: u32,
    pub handle: BytesN<32>,
}

#[contractevent]
pub struct EvGameFinished {
    pub player: Address,
    pub outcome: BytesN<32>,
    pub score: BytesN<32>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  External trait interfaces
// ═══════════════════════════════════════════════════════════════════════════════

/// Arithmetic engine over ciphertext handles.
///
/// Every returned handle is granted to `caller`, and operands must already
/// be granted to `caller`.
#[contractclient(name = "ExecutorClient")]
pub trait EncryptedArithmetic {
    fn trivial_encrypt(env: Env, caller: Address, value: u32) -> BytesN<32>;

    /// `None` when the proof does not bind `input` to `(caller, submitter, context)`
    /// or encrypts a type other than `expected_type`.
    fn ingest(
        env: Env,
        caller: Address,
        input: BytesN<32>,
        proof: Bytes,
        expected_type: u32,
        submitter: Address,
        context: Bytes,
    ) -> Option<BytesN<32>>;

    fn equal(env: Env, caller: Address, lhs: BytesN<32>, rhs: BytesN<32>) -> BytesN<32>;

    fn accumulate_and(env: Env, caller: Address, prior: BytesN<32>, next: BytesN<32>)
        -> BytesN<32>;

    fn select_add(
        env: Env,
        caller: Address,
        base: BytesN<32>,
        flag: BytesN<32>,
        bonus: BytesN<32>,
    ) -> BytesN<32>;
}

#[contractclient(name = "AclClient")]
pub trait AccessControl {
    fn allow(env: Env, sender: Address, handle: BytesN<32>, account: Address);
    fn is_allowed(env: Env, handle: BytesN<32>, account: Address) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum FateError {
    OutOfOrderStep = 1,
    InvalidProof = 2,
    InvalidStepRange = 3,
    GameNotStarted = 4,
    AdminNotSet = 5,
    ExecutorNotSet = 6,
    AclNotSet = 7,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub const PATH_LENGTH: u32 = 4;

/// Hidden target choice per step. Only ever used as an encrypted constant.
const TARGET_PATH: [u32; PATH_LENGTH as usize] = [1, 1, 1, 2];

/// Encrypted type tag of a path choice (U32 on the executor).
const CHOICE_FHE_TYPE: u32 = 4;

pub const INITIAL_SCORE: u32 = 1000;
pub const PATH_BONUS: u32 = 1000;

/// Returned by getters for values that were never set.
pub const SENTINEL_HANDLE: [u8; 32] = [0u8; 32];

/// Input binding context for a choice at `step`: u32 big-endian.
pub fn path_input_context(env: &Env, step: u32) -> Bytes {
    Bytes::from_array(env, &step.to_be_bytes())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct EncryptedFate;

#[contractimpl]
impl EncryptedFate {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor & Lifecycle
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, admin: Address, executor: Address, acl: Address) {
        env.storage()
            .instance()
            .set(&StorageKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&StorageKey::ExecutorAddress, &executor);
        env.storage()
            .instance()
            .set(&StorageKey::AclAddress, &acl);
    }

    /// Begin a new run for `player`, discarding any previous one.
    pub fn start_game(env: Env, player: Address) -> Result<(), FateError> {
        player.require_auth();

        let executor = ExecutorClient::new(&env, &Self::load_executor(&env)?);
        let acl = AclClient::new(&env, &Self::load_acl(&env)?);
        let this = env.current_contract_address();

        let restarted = store::load_player(&env, &player).is_started();

        let score = executor.trivial_encrypt(&this, &INITIAL_SCORE);
        acl.allow(&this, &score, &player);

        store::save_player(&env, &player, &PlayerState::started(&env, score));

        EvGameStarted { player, restarted }.publish(&env);
        Ok(())
    }

    /// Submit the encrypted choice for `step`.
    ///
    /// `step` must equal the number of steps already accepted. `input` and
    /// `proof` come from client-side encryption bound to this contract,
    /// `player` and [`path_input_context`]`(step)`.
    pub fn submit_path_choice(
        env: Env,
        player: Address,
        step: u32,
        input: BytesN<32>,
        proof: Bytes,
    ) -> Result<(), FateError> {
        player.require_auth();

        let mut state = store::load_player(&env, &player);
        let score = state.score.clone().ok_or(FateError::GameNotStarted)?;
        if state.finished || step != state.steps_submitted {
            return Err(FateError::OutOfOrderStep);
        }

        let executor = ExecutorClient::new(&env, &Self::load_executor(&env)?);
        let acl = AclClient::new(&env, &Self::load_acl(&env)?);
        let this = env.current_contract_address();

        let choice = executor
            .ingest(
                &this,
                &input,
                &proof,
                &CHOICE_FHE_TYPE,
                &player,
                &path_input_context(&env, step),
            )
            .ok_or(FateError::InvalidProof)?;

        state.choices.push_back(choice.clone());
        acl.allow(&this, &choice, &player);

        let target = executor.trivial_encrypt(&this, &TARGET_PATH[step as usize]);
        let step_match = executor.equal(&this, &choice, &target);

        // start_game clears the flag, so the fold begins at step 0
        let path_match = match state.path_match.take() {
            Some(prior) => executor.accumulate_and(&this, &prior, &step_match),
            None => step_match,
        };

        EvChoiceSubmitted {
            player: player.clone(),
            step,
            handle: choice,
        }
        .publish(&env);

        if step + 1 < PATH_LENGTH {
            state.steps_submitted = step + 1;
            state.path_match = Some(path_match);
        } else {
            let bonus = executor.trivial_encrypt(&this, &PATH_BONUS);
            let final_score = executor.select_add(&this, &score, &path_match, &bonus);

            acl.allow(&this, &path_match, &player);
            acl.allow(&this, &final_score, &player);

            state.steps_submitted = PATH_LENGTH;
            state.finished = true;
            state.outcome = Some(path_match.clone());
            state.score = Some(final_score.clone());

            EvGameFinished {
                player: player.clone(),
                outcome: path_match,
                score: final_score,
            }
            .publish(&env);
        }

        store::save_player(&env, &player, &state);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Queries
    // ───────────────────────────────────────────────────────────────────────────

    /// `(steps_submitted, finished)`; `(0, false)` for unknown players.
    pub fn get_progress(env: Env, player: Address) -> (u32, bool) {
        let state = store::load_player(&env, &player);
        (state.steps_submitted, state.finished)
    }

    pub fn get_encrypted_score(env: Env, player: Address) -> BytesN<32> {
        let state = store::load_player(&env, &player);
        state.score.unwrap_or_else(|| Self::sentinel(&env))
    }

    pub fn get_encrypted_outcome(env: Env, player: Address) -> BytesN<32> {
        let state = store::load_player(&env, &player);
        state.outcome.unwrap_or_else(|| Self::sentinel(&env))
    }

    pub fn get_encrypted_choice(
        env: Env,
        player: Address,
        step: u32,
    ) -> Result<BytesN<32>, FateError> {
        if step >= PATH_LENGTH {
            return Err(FateError::InvalidStepRange);
        }
        let state = store::load_player(&env, &player);
        Ok(state
            .choices
            .get(step)
            .unwrap_or_else(|| Self::sentinel(&env)))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, FateError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), FateError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::Admin, &new_admin);
        Ok(())
    }

    pub fn get_executor(env: Env) -> Result<Address, FateError> {
        Self::load_executor(&env)
    }

    /// Handles produced by the old executor stay in player records; only
    /// switch executors between deployments that share ciphertext storage.
    pub fn set_executor(env: Env, new_executor: Address) -> Result<(), FateError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::ExecutorAddress, &new_executor);
        Ok(())
    }

    pub fn get_acl(env: Env) -> Result<Address, FateError> {
        Self::load_acl(&env)
    }

    pub fn set_acl(env: Env, new_acl: Address) -> Result<(), FateError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::AclAddress, &new_acl);
        Ok(())
    }

    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), FateError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn sentinel(env: &Env) -> BytesN<32> {
        BytesN::from_array(env, &SENTINEL_HANDLE)
    }

    fn load_admin(env: &Env) -> Result<Address, FateError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(FateError::AdminNotSet)
    }

    fn load_executor(env: &Env) -> Result<Address, FateError> {
        env.storage()
            .instance()
            .get(&StorageKey::ExecutorAddress)
            .ok_or(FateError::ExecutorNotSet)
    }

    fn load_acl(env: &Env) -> Result<Address, FateError> {
        env.storage()
            .instance()
            .get(&StorageKey::AclAddress)
            .ok_or(FateError::AclNotSet)
    }
}
