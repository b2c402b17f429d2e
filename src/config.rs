//! Engine configuration with validation, defaults, and environment overrides.
//!
//! All protocol parameters live here so deployments can tune delay windows,
//! payout tables, and stake splits without touching engine code. A loaded
//! configuration is always validated before use.

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Payout schedule for one match tier. The multiplier is expressed in
/// tenths, so `multiplier_tenths = 8` pays 0.8x; the minimum factor is a
/// whole multiple that acts as a floor on the payout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierSchedule {
    pub multiplier_tenths: u64,
    pub min_factor: u64,
}

impl TierSchedule {
    /// Largest whole multiple of the stake this tier can pay.
    pub fn effective_multiple(&self) -> u64 {
        (self.multiplier_tenths / 10).max(self.min_factor)
    }
}

/// Payout schedules per match tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PayoutTable {
    pub top: TierSchedule,
    pub mid: TierSchedule,
    pub low: TierSchedule,
}

impl Default for PayoutTable {
    fn default() -> Self {
        Self {
            top: TierSchedule {
                multiplier_tenths: 1000,
                min_factor: 50,
            },
            mid: TierSchedule {
                multiplier_tenths: 8,
                min_factor: 5,
            },
            low: TierSchedule {
                multiplier_tenths: 2,
                min_factor: 1,
            },
        }
    }
}

/// Basis-point split of every stake. Shares may sum to less than 100%;
/// the residual stays unallocated in the house buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StakeSplits {
    pub team_bps: u64,
    pub pool_bps: u64,
    pub reward_bps: u64,
    pub jackpot_bps: u64,
}

impl StakeSplits {
    pub fn total_bps(&self) -> u64 {
        self.team_bps + self.pool_bps + self.reward_bps + self.jackpot_bps
    }

    /// Split an amount into its shares. Each share is floored; whatever the
    /// floors leave behind joins the residual.
    pub fn apply(&self, amount: u64) -> SplitAmounts {
        let part = |bps: u64| -> u64 {
            ((amount as u128 * bps as u128) / BPS_DENOMINATOR as u128) as u64
        };
        let team = part(self.team_bps);
        let pool = part(self.pool_bps);
        let reward = part(self.reward_bps);
        let jackpot = part(self.jackpot_bps);
        SplitAmounts {
            team,
            pool,
            reward,
            jackpot,
            residual: amount - team - pool - reward - jackpot,
        }
    }
}

impl Default for StakeSplits {
    fn default() -> Self {
        Self {
            team_bps: 500,
            pool_bps: 8500,
            reward_bps: 300,
            jackpot_bps: 200,
        }
    }
}

/// Concrete share amounts produced by [`StakeSplits::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitAmounts {
    pub team: u64,
    pub pool: u64,
    pub reward: u64,
    pub jackpot: u64,
    pub residual: u64,
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rounds that must elapse after commit before a reveal is accepted.
    pub min_reveal_delay: u64,
    /// Rounds after which the reveal window closes and only the emergency
    /// path can settle the request.
    pub max_reveal_delay: u64,
    /// Maximum number of per-round entropy records folded into the
    /// request lane at reveal time.
    pub entropy_window: u64,
    /// Number of symbols drawn per outcome.
    pub symbols_per_draw: u8,
    /// Symbols are drawn from `[0, symbol_range)`.
    pub symbol_range: u8,
    /// Rounds a pool contribution stays locked after each top-up.
    pub lock_period: u64,
    /// Penalty taken by the treasury on emergency withdrawal, in bps.
    pub emergency_penalty_bps: u64,
    /// Minimum rounds between jackpot awards.
    pub jackpot_cooldown: u64,
    pub splits: StakeSplits,
    pub payouts: PayoutTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_reveal_delay: 2,
            max_reveal_delay: 250,
            entropy_window: 32,
            symbols_per_draw: 4,
            symbol_range: 10,
            lock_period: 1000,
            emergency_penalty_bps: 1000,
            jackpot_cooldown: 5000,
            splits: StakeSplits::default(),
            payouts: PayoutTable::default(),
        }
    }
}

impl EngineConfig {
    /// The largest multiple of a stake any single win can pay. The maximum
    /// bet is derived from this so a maximal win never exceeds pool funds.
    pub fn max_multiplier(&self) -> u64 {
        self.payouts.top.effective_multiple().max(1)
    }

    /// Load configuration from a TOML file, apply `FAIRSPIN_*` environment
    /// overrides, and validate the result.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse TOML: {}", e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides for operationally tuned fields.
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        fn parse_var(name: &str) -> EngineResult<Option<u64>> {
            match env::var(name) {
                Ok(raw) => raw
                    .parse()
                    .map(Some)
                    .map_err(|_| EngineError::Config(format!("{} must be an integer, got {:?}", name, raw))),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = parse_var("FAIRSPIN_MIN_REVEAL_DELAY")? {
            self.min_reveal_delay = v;
        }
        if let Some(v) = parse_var("FAIRSPIN_MAX_REVEAL_DELAY")? {
            self.max_reveal_delay = v;
        }
        if let Some(v) = parse_var("FAIRSPIN_LOCK_PERIOD")? {
            self.lock_period = v;
        }
        if let Some(v) = parse_var("FAIRSPIN_JACKPOT_COOLDOWN")? {
            self.jackpot_cooldown = v;
        }
        Ok(())
    }

    /// Reject parameter sets the engine cannot operate under.
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_reveal_delay == 0 {
            return Err(EngineError::Config(
                "min_reveal_delay must be at least one round".into(),
            ));
        }
        if self.max_reveal_delay < self.min_reveal_delay {
            return Err(EngineError::Config(format!(
                "max_reveal_delay {} is below min_reveal_delay {}",
                self.max_reveal_delay, self.min_reveal_delay
            )));
        }
        if self.entropy_window == 0 {
            return Err(EngineError::Config("entropy_window must be positive".into()));
        }
        if self.symbols_per_draw < 3 {
            return Err(EngineError::Config(
                "symbols_per_draw must be at least 3 to support all match tiers".into(),
            ));
        }
        if self.symbol_range == 0 {
            return Err(EngineError::Config("symbol_range must be positive".into()));
        }
        if self.splits.total_bps() > BPS_DENOMINATOR {
            return Err(EngineError::Config(format!(
                "stake splits sum to {} bps, exceeding 100%",
                self.splits.total_bps()
            )));
        }
        if self.emergency_penalty_bps > BPS_DENOMINATOR {
            return Err(EngineError::Config(
                "emergency_penalty_bps exceeds 100%".into(),
            ));
        }
        for (name, tier) in [
            ("top", &self.payouts.top),
            ("mid", &self.payouts.mid),
            ("low", &self.payouts.low),
        ] {
            if tier.multiplier_tenths == 0 && tier.min_factor == 0 {
                return Err(EngineError::Config(format!(
                    "{} tier pays nothing; remove the tier or give it a multiplier",
                    name
                )));
            }
        }
        Ok(())
    }
}
