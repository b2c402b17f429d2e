//! Entropy aggregation over ledger rounds.
//!
//! A single rolling accumulator is folded forward on every observed round.
//! Each fold is one-way and strictly sequential: the new value depends on
//! its predecessor, so no observation can be replayed to recover a prior
//! accumulator state. Per-round records are retained so reveals can gather
//! the environmental history between commit and reveal.

use crate::types::RoundInfo;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Immutable snapshot of one round's environmental inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyRecord {
    pub round_id: u64,
    pub round_hash: [u8; 32],
    pub timestamp: u64,
    pub difficulty: u64,
}

impl EntropyRecord {
    pub fn from_round(round: &RoundInfo) -> Self {
        Self {
            round_id: round.id,
            round_hash: round.hash,
            timestamp: round.timestamp,
            difficulty: round.difficulty,
        }
    }
}

/// The rolling global seed. Only [`EntropyPool::observe_round`] may fold it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyAccumulator {
    digest: [u8; 32],
    version: u64,
}

impl EntropyAccumulator {
    fn genesis() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fairspin:entropy:genesis");
        Self {
            digest: hasher.finalize().into(),
            version: 0,
        }
    }

    fn fold(&mut self, record: &EntropyRecord) {
        let mut hasher = Sha256::new();
        hasher.update(self.digest);
        hasher.update(record.round_id.to_le_bytes());
        hasher.update(record.round_hash);
        hasher.update(record.timestamp.to_le_bytes());
        hasher.update(record.difficulty.to_le_bytes());
        self.digest = hasher.finalize().into();
        self.version += 1;
    }

    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Accumulator plus the per-round record history.
#[derive(Clone, Debug)]
pub struct EntropyPool {
    accumulator: EntropyAccumulator,
    records: BTreeMap<u64, EntropyRecord>,
}

impl EntropyPool {
    pub fn new() -> Self {
        Self {
            accumulator: EntropyAccumulator::genesis(),
            records: BTreeMap::new(),
        }
    }

    /// Record the round and fold it into the accumulator. Always succeeds.
    /// Observing the same round twice double-mixes the accumulator, which
    /// only adds unpredictability; the record map keeps one entry per round.
    pub fn observe_round(&mut self, round: &RoundInfo) -> &EntropyRecord {
        let record = EntropyRecord::from_round(round);
        self.accumulator.fold(&record);
        self.records.insert(record.round_id, record);
        &self.records[&record.round_id]
    }

    pub fn accumulator(&self) -> &EntropyAccumulator {
        &self.accumulator
    }

    /// Up to `window` most recent records with round ids in
    /// `[origin_round, current_round]`, newest first.
    pub fn records_back_from(
        &self,
        current_round: u64,
        origin_round: u64,
        window: u64,
    ) -> Vec<EntropyRecord> {
        self.records
            .range(origin_round..=current_round)
            .rev()
            .take(window as usize)
            .map(|(_, r)| *r)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for EntropyPool {
    fn default() -> Self {
        Self::new()
    }
}
