//! Commit-reveal registry for randomness requests.
//!
//! A request is `Open` until revealed; there is no persisted expired state.
//! A reveal outside the valid round window fails and the request stays open
//! until the emergency path settles it. Reveal and fulfillment are marked
//! in a single step so a revealed-but-unfulfilled request is never
//! observable.
//!
//! Outcome seeds mix three independent hash lanes (user-supplied,
//! chain-derived, request-derived) so no single input category can
//! determine the result on its own, and so the ordering-privileged party
//! cannot bias the draw by reordering rounds alone.

use crate::entropy::EntropyRecord;
use crate::errors::{EngineError, EngineResult};
use crate::types::{AccountId, RoundInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One randomness request, retained forever for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitmentRequest {
    pub request_id: u64,
    pub commitment: [u8; 32],
    pub origin_round: u64,
    pub origin_timestamp: u64,
    pub owner: AccountId,
    /// The bet this request belongs to.
    pub correlation_id: u64,
    /// Per-owner nonce assigned at commit time, folded into the user lane.
    pub owner_nonce: u64,
    pub revealed: bool,
    pub fulfilled: bool,
}

/// Binding digest of a hidden secret: `H(secret, salt, owner, correlation)`.
pub fn commitment_digest(
    secret: u64,
    salt: u64,
    owner: &AccountId,
    correlation_id: u64,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin:commitment");
    hasher.update(secret.to_le_bytes());
    hasher.update(salt.to_le_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(correlation_id.to_le_bytes());
    hasher.finalize().into()
}

/// User lane: everything the committing party controls.
pub fn user_lane(
    secret: u64,
    salt: u64,
    owner: &AccountId,
    correlation_id: u64,
    owner_nonce: u64,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin:lane:user");
    hasher.update(secret.to_le_bytes());
    hasher.update(salt.to_le_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(correlation_id.to_le_bytes());
    hasher.update(owner_nonce.to_le_bytes());
    hasher.finalize().into()
}

/// Chain lane: the accumulator snapshot plus current round metadata.
pub fn chain_lane(accumulator: &[u8; 32], accumulator_version: u64, round: &RoundInfo) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin:lane:chain");
    hasher.update(accumulator);
    hasher.update(accumulator_version.to_le_bytes());
    hasher.update(round.id.to_le_bytes());
    hasher.update(round.hash);
    hasher.update(round.timestamp.to_le_bytes());
    hasher.update(round.difficulty.to_le_bytes());
    hasher.finalize().into()
}

/// Request lane: the gathered multi-round history plus request-specific
/// values, including a pool-size-dependent term.
pub fn request_lane(records: &[EntropyRecord], request_id: u64, pool_entropy: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin:lane:request");
    for record in records {
        hasher.update(record.round_id.to_le_bytes());
        hasher.update(record.round_hash);
        hasher.update(record.timestamp.to_le_bytes());
        hasher.update(record.difficulty.to_le_bytes());
    }
    hasher.update(request_id.to_le_bytes());
    hasher.update(pool_entropy.to_le_bytes());
    hasher.finalize().into()
}

/// Combine the lanes into the final seed. The emergency path passes no user
/// lane; those draws rely on environmental inputs only.
pub fn final_seed(user: Option<[u8; 32]>, chain: [u8; 32], request: [u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin:seed");
    match user {
        Some(lane) => {
            hasher.update([1u8]);
            hasher.update(lane);
        }
        None => hasher.update([0u8]),
    }
    hasher.update(chain);
    hasher.update(request);
    hasher.finalize().into()
}

/// Draw `count` symbols in `[0, range)` from a seed.
pub fn draw_symbols(seed: &[u8; 32], count: u8, range: u8, owner_nonce: u64) -> Vec<u8> {
    (0..count)
        .map(|index| {
            let mut hasher = Sha256::new();
            hasher.update(b"fairspin:symbol");
            hasher.update(seed);
            hasher.update((index as u64).to_le_bytes());
            hasher.update(owner_nonce.to_le_bytes());
            let digest = hasher.finalize();
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[..8]);
            (u64::from_le_bytes(word) % range as u64) as u8
        })
        .collect()
}

/// The commit-reveal request registry.
#[derive(Debug, Default)]
pub struct CommitmentRegistry {
    requests: BTreeMap<u64, CommitmentRequest>,
    next_request_id: u64,
    owner_nonces: HashMap<AccountId, u64>,
    authorized_committers: BTreeSet<AccountId>,
}

impl CommitmentRegistry {
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            ..Self::default()
        }
    }

    /// Permit `account` to create requests.
    pub fn authorize_committer(&mut self, account: AccountId) {
        self.authorized_committers.insert(account);
    }

    pub fn request(&self, request_id: u64) -> EngineResult<&CommitmentRequest> {
        self.requests
            .get(&request_id)
            .ok_or(EngineError::UnknownRequest(request_id))
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Register a commitment. Allocates a monotonic request id and bumps
    /// the owner's nonce. The caller must observe the current round in the
    /// same transaction.
    pub fn commit(
        &mut self,
        caller: &AccountId,
        correlation_id: u64,
        commitment: [u8; 32],
        owner: AccountId,
        round: &RoundInfo,
    ) -> EngineResult<u64> {
        if !self.authorized_committers.contains(caller) {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation: "commit",
            });
        }
        if commitment == [0u8; 32] {
            return Err(EngineError::InvalidCommitment);
        }
        let nonce = self.owner_nonces.entry(owner).or_insert(0);
        *nonce += 1;
        let owner_nonce = *nonce;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.requests.insert(
            request_id,
            CommitmentRequest {
                request_id,
                commitment,
                origin_round: round.id,
                origin_timestamp: round.timestamp,
                owner,
                correlation_id,
                owner_nonce,
                revealed: false,
                fulfilled: false,
            },
        );
        tracing::debug!(request_id, correlation_id, origin_round = round.id, "commitment registered");
        Ok(request_id)
    }

    /// Check every reveal precondition without mutating: ownership, single
    /// reveal, round window, and the commitment binding itself.
    pub fn validate_reveal(
        &self,
        request_id: u64,
        caller: &AccountId,
        secret: u64,
        salt: u64,
        current_round: u64,
        min_delay: u64,
        max_delay: u64,
    ) -> EngineResult<&CommitmentRequest> {
        let request = self.request(request_id)?;
        if request.owner != *caller {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation: "reveal",
            });
        }
        if request.revealed {
            return Err(EngineError::AlreadyRevealed(request_id));
        }
        let revealable_at = request.origin_round + min_delay;
        if current_round < revealable_at {
            return Err(EngineError::TooEarly {
                request_id,
                current_round,
                revealable_at,
            });
        }
        let expired_at = request.origin_round + max_delay;
        if current_round > expired_at {
            return Err(EngineError::Expired {
                request_id,
                current_round,
                expired_at,
            });
        }
        let expected =
            commitment_digest(secret, salt, &request.owner, request.correlation_id);
        if expected != request.commitment {
            return Err(EngineError::CommitmentMismatch(request_id));
        }
        Ok(request)
    }

    /// Check the emergency-reveal preconditions: the request must be stuck,
    /// meaning unrevealed and past its expiry.
    pub fn validate_emergency(
        &self,
        request_id: u64,
        current_round: u64,
        max_delay: u64,
    ) -> EngineResult<&CommitmentRequest> {
        let request = self.request(request_id)?;
        if request.revealed {
            return Err(EngineError::AlreadyRevealed(request_id));
        }
        let eligible_at = request.origin_round + max_delay + 1;
        if current_round < eligible_at {
            return Err(EngineError::NotReady {
                request_id,
                current_round,
                eligible_at,
            });
        }
        Ok(request)
    }

    /// Flip `revealed` and `fulfilled` together. Separate transitions are
    /// deliberately not offered; a half-completed request is a protocol
    /// violation.
    pub fn mark_settled(&mut self, request_id: u64) -> EngineResult<()> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(EngineError::UnknownRequest(request_id))?;
        if request.revealed {
            return Err(EngineError::AlreadyRevealed(request_id));
        }
        request.revealed = true;
        request.fulfilled = true;
        Ok(())
    }
}
