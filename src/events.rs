//! Observable engine events for auditing and integration.
//!
//! Events are published on a broadcast channel after all state mutation for
//! the triggering operation has completed, exactly once per operation.
//! Absent or lagging subscribers never block the engine.

use crate::outcome::MatchTier;
use crate::types::{AccountId, TokenId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineEvent {
    CommitmentMade {
        request_id: u64,
        bet_id: u64,
        owner: AccountId,
        origin_round: u64,
    },
    EntropyObserved {
        round_id: u64,
        accumulator_version: u64,
    },
    RandomnessRevealed {
        request_id: u64,
        bet_id: u64,
        symbols: Vec<u8>,
        emergency: bool,
    },
    BetPlaced {
        bet_id: u64,
        owner: AccountId,
        token: TokenId,
        amount: u64,
        request_id: u64,
    },
    BetSettled {
        bet_id: u64,
        owner: AccountId,
        token: TokenId,
        stake: u64,
        payout: u64,
        tier: Option<MatchTier>,
    },
    JackpotWon {
        bet_id: u64,
        owner: AccountId,
        token: TokenId,
        amount: u64,
        round_id: u64,
    },
    PoolContribution {
        contributor: AccountId,
        token: TokenId,
        amount: u64,
        unlock_round: u64,
    },
    PoolWithdrawal {
        contributor: AccountId,
        token: TokenId,
        amount: u64,
    },
    PoolEmergencyWithdrawal {
        contributor: AccountId,
        token: TokenId,
        refund: u64,
        penalty: u64,
    },
}

/// Broadcast fan-out for engine events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Send errors only mean nobody is subscribed.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}
