//! Error taxonomy for all engine operations.
//!
//! Every failure aborts its whole transaction: callers observe either the
//! complete effect of an operation or no effect at all. Retry policy is the
//! caller's concern; nothing in the engine retries silently.

use crate::types::{AccountId, TokenId};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // Authorization
    #[error("caller {caller} is not authorized for {operation}")]
    Unauthorized {
        caller: AccountId,
        operation: &'static str,
    },

    // Commitment integrity
    #[error("commitment hash must not be the zero sentinel")]
    InvalidCommitment,

    #[error("request {0} does not exist")]
    UnknownRequest(u64),

    #[error("request {0} was already revealed")]
    AlreadyRevealed(u64),

    #[error("revealed secret does not match the commitment for request {0}")]
    CommitmentMismatch(u64),

    // Timing
    #[error("request {request_id} is not revealable until round {revealable_at} (current {current_round})")]
    TooEarly {
        request_id: u64,
        current_round: u64,
        revealable_at: u64,
    },

    #[error("reveal window for request {request_id} closed at round {expired_at} (current {current_round})")]
    Expired {
        request_id: u64,
        current_round: u64,
        expired_at: u64,
    },

    #[error("request {request_id} is not eligible for emergency reveal until round {eligible_at} (current {current_round})")]
    NotReady {
        request_id: u64,
        current_round: u64,
        eligible_at: u64,
    },

    // Bet lifecycle
    #[error("bet {0} does not exist")]
    UnknownBet(u64),

    #[error("bet {0} was already settled")]
    AlreadySettled(u64),

    #[error("token {0} is not supported")]
    TokenNotSupported(TokenId),

    #[error("token {0} is already listed")]
    TokenAlreadyListed(TokenId),

    #[error("amount {amount} is below the minimum stake {min_stake}")]
    BelowMinimum { amount: u64, min_stake: u64 },

    #[error("amount {amount} exceeds the pool-derived maximum bet {max_bet}")]
    AboveMaximum { amount: u64, max_bet: u64 },

    #[error("caller has no qualifying pool contribution for token {0}")]
    InsufficientEligibility(TokenId),

    // Pool ledger
    #[error("account {0} failed the external eligibility check")]
    NotEligible(AccountId),

    #[error("contribution is locked until round {unlock_round} (current {current_round})")]
    Locked {
        unlock_round: u64,
        current_round: u64,
    },

    #[error("no active contribution for token {0}")]
    NoActiveContribution(TokenId),

    #[error("requested {requested} but only {available} is available")]
    InsufficientAmount { requested: u64, available: u64 },

    #[error("pool for {token} cannot fund {requested}; active contributions total {available}")]
    InsufficientPoolFunds {
        token: TokenId,
        requested: u64,
        available: u64,
    },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    // External collaborators
    #[error("value transfer failed: {0}")]
    TransferFailed(String),

    #[error("eligibility oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("reward distribution failed: {0}")]
    RewardDistributionFailed(String),

    // Configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
