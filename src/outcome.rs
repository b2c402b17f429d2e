//! Pure outcome evaluation: symbols to match tier to payout.

use crate::config::{PayoutTable, TierSchedule};
use serde::{Deserialize, Serialize};

/// Win classification from how many drawn symbols match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    /// All symbols match. Jackpot eligible.
    Top,
    /// All but one match.
    Mid,
    /// All but two match.
    Low,
}

impl MatchTier {
    pub fn schedule(self, table: &PayoutTable) -> TierSchedule {
        match self {
            MatchTier::Top => table.top,
            MatchTier::Mid => table.mid,
            MatchTier::Low => table.low,
        }
    }
}

/// Most frequent symbol and its count. Ties resolve to the smallest symbol
/// so the result is deterministic.
pub fn best_match(symbols: &[u8]) -> (u8, usize) {
    let mut counts = [0usize; 256];
    for &s in symbols {
        counts[s as usize] += 1;
    }
    let mut best = (0u8, 0usize);
    for (symbol, &count) in counts.iter().enumerate() {
        if count > best.1 {
            best = (symbol as u8, count);
        }
    }
    best
}

/// Classify a draw into a match tier, if it wins at all.
pub fn classify(symbols: &[u8]) -> Option<MatchTier> {
    let n = symbols.len();
    let (_, count) = best_match(symbols);
    if count == n {
        Some(MatchTier::Top)
    } else if count + 1 == n {
        Some(MatchTier::Mid)
    } else if count + 2 == n {
        Some(MatchTier::Low)
    } else {
        None
    }
}

/// Uncapped payout for a winning stake: the larger of the fractional
/// multiplier and the whole-multiple floor. Callers cap the result at what
/// the pool can actually fund.
pub fn payout_for(stake: u64, tier: MatchTier, table: &PayoutTable) -> u64 {
    let schedule = tier.schedule(table);
    let by_multiplier = (stake as u128 * schedule.multiplier_tenths as u128) / 10;
    let by_floor = stake as u128 * schedule.min_factor as u128;
    by_multiplier.max(by_floor).min(u64::MAX as u128) as u64
}

/// Whether a top-tier win also takes the jackpot. Awards are rare by
/// construction: the cooldown must have elapsed and the jackpot must hold
/// something, independent of draw probability.
pub fn jackpot_due(
    tier: Option<MatchTier>,
    current_round: u64,
    last_jackpot_round: u64,
    cooldown: u64,
    jackpot_balance: u64,
) -> bool {
    tier == Some(MatchTier::Top)
        && jackpot_balance > 0
        && current_round >= last_jackpot_round.saturating_add(cooldown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_classification() {
        assert_eq!(classify(&[3, 3, 3, 3]), Some(MatchTier::Top));
        assert_eq!(classify(&[3, 3, 3, 9]), Some(MatchTier::Mid));
        assert_eq!(classify(&[3, 3, 7, 9]), Some(MatchTier::Low));
        assert_eq!(classify(&[1, 2, 3, 4]), None);
    }

    #[test]
    fn best_match_prefers_smallest_symbol_on_tie() {
        assert_eq!(best_match(&[5, 5, 2, 2]), (2, 2));
    }

    #[test]
    fn payout_takes_the_larger_of_multiplier_and_floor() {
        let table = PayoutTable::default();
        // stake 100, mid tier: max(100 * 8 / 10, 100 * 5) = 500.
        assert_eq!(payout_for(100, MatchTier::Mid, &table), 500);
        // Top tier: max(100 * 1000 / 10, 100 * 50) = 10_000.
        assert_eq!(payout_for(100, MatchTier::Top, &table), 10_000);
    }

    #[test]
    fn payout_multiplier_dominates_when_large() {
        let table = PayoutTable {
            mid: TierSchedule {
                multiplier_tenths: 80,
                min_factor: 5,
            },
            ..PayoutTable::default()
        };
        assert_eq!(payout_for(100, MatchTier::Mid, &table), 800);
    }

    #[test]
    fn jackpot_requires_top_tier_cooldown_and_balance() {
        assert!(jackpot_due(Some(MatchTier::Top), 6000, 0, 5000, 10));
        assert!(!jackpot_due(Some(MatchTier::Top), 4000, 0, 5000, 10));
        assert!(!jackpot_due(Some(MatchTier::Top), 6000, 0, 5000, 0));
        assert!(!jackpot_due(Some(MatchTier::Mid), 6000, 0, 5000, 10));
        assert!(!jackpot_due(None, 6000, 0, 5000, 10));
    }
}
