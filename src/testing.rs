//! In-memory collaborator implementations for tests and simulations.
//!
//! These fakes keep the full engine exercisable without a real ledger:
//! a manually advanced round clock, a balance-map oracle, a strict
//! double-entry transfer ledger, and a recording reward sink.

use crate::errors::{EngineError, EngineResult};
use crate::traits::{EligibilityOracle, RewardSink, RoundSource, ValueTransfer};
use crate::types::{AccountId, RoundInfo, TokenId};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A round clock advanced by hand. Round hashes are derived from the round
/// id so histories are reproducible across runs.
pub struct SimulatedChain {
    state: Mutex<RoundInfo>,
}

impl SimulatedChain {
    pub fn starting_at(round_id: u64) -> Self {
        Self {
            state: Mutex::new(Self::round(round_id)),
        }
    }

    fn round(id: u64) -> RoundInfo {
        let mut hasher = Sha256::new();
        hasher.update(b"sim-round");
        hasher.update(id.to_le_bytes());
        RoundInfo {
            id,
            hash: hasher.finalize().into(),
            timestamp: 1_700_000_000 + id * 12,
            difficulty: 1_000 + id,
        }
    }

    pub fn advance(&self, rounds: u64) {
        let mut state = self.state.lock().expect("sim chain lock");
        *state = Self::round(state.id + rounds);
    }

    pub fn current_id(&self) -> u64 {
        self.state.lock().expect("sim chain lock").id
    }
}

#[async_trait]
impl RoundSource for SimulatedChain {
    async fn current_round(&self) -> RoundInfo {
        *self.state.lock().expect("sim chain lock")
    }
}

/// Oracle backed by a plain balance map, with a switch to simulate outages.
#[derive(Default)]
pub struct StaticOracle {
    balances: Mutex<HashMap<AccountId, u64>>,
    unavailable: AtomicBool,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, account: AccountId, balance: u64) {
        self.balances
            .lock()
            .expect("oracle lock")
            .insert(account, balance);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EligibilityOracle for StaticOracle {
    async fn balance_of(&self, account: &AccountId) -> EngineResult<u64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::OracleUnavailable("oracle offline".into()));
        }
        Ok(*self
            .balances
            .lock()
            .expect("oracle lock")
            .get(account)
            .unwrap_or(&0))
    }
}

/// Strict in-memory transfer ledger: a transfer with a known sender fails
/// on insufficient balance, matching the atomic all-or-nothing contract.
#[derive(Default)]
pub struct LedgerTransfers {
    accounts: Mutex<HashMap<(AccountId, TokenId), u64>>,
    fail_next: AtomicBool,
}

impl LedgerTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with funds from outside the system.
    pub fn mint(&self, account: AccountId, token: &TokenId, amount: u64) {
        let mut accounts = self.accounts.lock().expect("transfer lock");
        *accounts.entry((account, token.clone())).or_insert(0) += amount;
    }

    pub fn balance(&self, account: &AccountId, token: &TokenId) -> u64 {
        *self
            .accounts
            .lock()
            .expect("transfer lock")
            .get(&(*account, token.clone()))
            .unwrap_or(&0)
    }

    /// Make the next transfer fail, to exercise abort paths.
    pub fn fail_next_transfer(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ValueTransfer for LedgerTransfers {
    async fn transfer(
        &self,
        from: Option<&AccountId>,
        to: &AccountId,
        token: &TokenId,
        amount: u64,
    ) -> EngineResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::TransferFailed("injected failure".into()));
        }
        let mut accounts = self.accounts.lock().expect("transfer lock");
        if let Some(from) = from {
            let balance = accounts.entry((*from, token.clone())).or_insert(0);
            if *balance < amount {
                return Err(EngineError::TransferFailed(format!(
                    "{} holds {} {} but {} is required",
                    from, balance, token, amount
                )));
            }
            *balance -= amount;
        }
        *accounts.entry((*to, token.clone())).or_insert(0) += amount;
        Ok(())
    }
}

/// Reward sink that records every distribution, with a failure switch.
#[derive(Default)]
pub struct RecordingRewards {
    distributed: Mutex<Vec<(TokenId, u64)>>,
    fail: AtomicBool,
}

impl RecordingRewards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_for(&self, token: &TokenId) -> u64 {
        self.distributed
            .lock()
            .expect("rewards lock")
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, amount)| amount)
            .sum()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RewardSink for RecordingRewards {
    async fn distribute_rewards(&self, token: &TokenId, amount: u64) -> EngineResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::RewardDistributionFailed(
                "reward service down".into(),
            ));
        }
        self.distributed
            .lock()
            .expect("rewards lock")
            .push((token.clone(), amount));
        Ok(())
    }
}
