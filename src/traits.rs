//! External collaborator interfaces.
//!
//! The engine treats the surrounding ledger environment and its value rails
//! as trait objects so they can be swapped for in-memory fakes in tests.
//! Every collaborator is specified only at its interface; the engine never
//! assumes anything about its internals beyond what is documented here.

use crate::errors::EngineResult;
use crate::types::{AccountId, RoundInfo, TokenId};
use async_trait::async_trait;

/// Source of per-round environmental values from the underlying ledger.
#[async_trait]
pub trait RoundSource: Send + Sync {
    /// The round the engine is currently executing in. Monotonically
    /// non-decreasing across calls.
    async fn current_round(&self) -> RoundInfo;
}

/// Read-only balance oracle used for stake-eligibility checks.
///
/// Any failure from this oracle is read as "not eligible", never as a
/// fatal engine error.
#[async_trait]
pub trait EligibilityOracle: Send + Sync {
    async fn balance_of(&self, account: &AccountId) -> EngineResult<u64>;
}

/// Atomic value-transfer service. A transfer either moves the full amount
/// or fails without effect; the engine orders its own state mutation after
/// all transfers in a transaction so a failure here aborts cleanly.
#[async_trait]
pub trait ValueTransfer: Send + Sync {
    /// Move `amount` of `token` from `from` to `to`. A `from` of `None`
    /// denotes an external top-up into the system.
    async fn transfer(
        &self,
        from: Option<&AccountId>,
        to: &AccountId,
        token: &TokenId,
        amount: u64,
    ) -> EngineResult<()>;
}

/// Best-effort reward distribution. Failures are logged by the engine and
/// never block bet settlement.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn distribute_rewards(&self, token: &TokenId, amount: u64) -> EngineResult<()>;
}
