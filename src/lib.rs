//! Fairspin: a provably-fair randomness and payout settlement engine for
//! multi-token wagering.
//!
//! The engine couples three subsystems that must agree on ordering and
//! never expose partial state:
//!
//! - a commit-reveal randomness registry over rolling environmental
//!   entropy ([`commitment`], [`entropy`]),
//! - a bet lifecycle coordinator that binds each wager to a randomness
//!   request and settles on its fulfillment ([`engine`], [`outcome`]),
//! - a proportionally-owned liquidity pool ledger that funds payouts
//!   without ever breaking value conservation ([`pool`]).
//!
//! The surrounding ledger environment (round clock, balance oracle, value
//! transfer rails, reward distribution) is abstracted behind the traits in
//! [`traits`]; in-memory implementations for tests live in [`testing`].

pub mod commitment;
pub mod config;
pub mod engine;
pub mod entropy;
pub mod errors;
pub mod events;
pub mod outcome;
pub mod pool;
pub mod testing;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Collaborators, Engine, SettlementRecord};
pub use errors::{EngineError, EngineResult};
pub use events::EngineEvent;
pub use outcome::MatchTier;
pub use types::{AccountId, RoundInfo, TokenId};
