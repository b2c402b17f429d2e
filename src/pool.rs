//! Per-token liquidity pools and proportionally-owned contributor shares.
//!
//! The ledger maintains one invariant at all times: for every token, the
//! sum of active contributor shares never exceeds the pool balance, and
//! every proportional deduction conserves value exactly. The integer
//! rounding remainder of a deduction is assigned deterministically (largest
//! contributor first, one unit at a time) rather than dropped.

use crate::config::BPS_DENOMINATOR;
use crate::errors::{EngineError, EngineResult};
use crate::types::{AccountId, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Shared liquidity backing one token's payouts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPool {
    pub token: TokenId,
    pub pool_balance: u64,
    pub jackpot_balance: u64,
    pub total_wagered: u64,
    pub min_stake: u64,
    pub last_jackpot_round: u64,
}

/// One contributor's stake in one token pool. The lock extends on every
/// top-up; `active` flips false only when the amount reaches zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContributorShare {
    pub contributor: AccountId,
    pub token: TokenId,
    pub amount: u64,
    pub unlock_round: u64,
    pub active: bool,
}

/// What an emergency withdrawal pays where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmergencyPayout {
    pub refund: u64,
    pub penalty: u64,
}

/// The pool ledger. All mutation goes through these operations; nothing
/// else may touch pool or share balances.
#[derive(Debug, Default)]
pub struct PoolBook {
    pools: HashMap<TokenId, TokenPool>,
    shares: BTreeMap<(TokenId, AccountId), ContributorShare>,
    // Ordered active sets per token so deduction iterates deterministically.
    contributors: HashMap<TokenId, BTreeSet<AccountId>>,
    authorized_deductors: BTreeSet<AccountId>,
}

impl PoolBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit `account` to call [`PoolBook::deduct_from_pools`].
    pub fn authorize_deductor(&mut self, account: AccountId) {
        self.authorized_deductors.insert(account);
    }

    pub fn list_token(&mut self, token: TokenId, min_stake: u64) -> EngineResult<()> {
        if self.pools.contains_key(&token) {
            return Err(EngineError::TokenAlreadyListed(token));
        }
        self.pools.insert(
            token.clone(),
            TokenPool {
                token,
                pool_balance: 0,
                jackpot_balance: 0,
                total_wagered: 0,
                min_stake,
                last_jackpot_round: 0,
            },
        );
        Ok(())
    }

    pub fn pool(&self, token: &TokenId) -> EngineResult<&TokenPool> {
        self.pools
            .get(token)
            .ok_or_else(|| EngineError::TokenNotSupported(token.clone()))
    }

    fn pool_mut(&mut self, token: &TokenId) -> EngineResult<&mut TokenPool> {
        self.pools
            .get_mut(token)
            .ok_or_else(|| EngineError::TokenNotSupported(token.clone()))
    }

    pub fn share(&self, contributor: &AccountId, token: &TokenId) -> Option<&ContributorShare> {
        self.shares.get(&(token.clone(), *contributor))
    }

    /// Whether `contributor` holds an active, positive share for `token`.
    pub fn has_active_share(&self, contributor: &AccountId, token: &TokenId) -> bool {
        self.share(contributor, token)
            .map(|s| s.active && s.amount > 0)
            .unwrap_or(false)
    }

    /// Sum of active contributor shares for a token.
    pub fn total_active(&self, token: &TokenId) -> u64 {
        self.contributors
            .get(token)
            .map(|set| {
                set.iter()
                    .filter_map(|c| self.shares.get(&(token.clone(), *c)))
                    .map(|s| s.amount)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn active_contributor_count(&self, token: &TokenId) -> usize {
        self.contributors.get(token).map(|s| s.len()).unwrap_or(0)
    }

    /// Credit a new contribution. The caller has already performed the
    /// eligibility check and moved the funds in.
    pub fn contribute(
        &mut self,
        contributor: &AccountId,
        token: &TokenId,
        amount: u64,
        current_round: u64,
        lock_period: u64,
    ) -> EngineResult<u64> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let unlock_round = current_round.saturating_add(lock_period);
        {
            let pool = self.pool_mut(token)?;
            pool.pool_balance = pool.pool_balance.saturating_add(amount);
        }
        let share = self
            .shares
            .entry((token.clone(), *contributor))
            .or_insert_with(|| ContributorShare {
                contributor: *contributor,
                token: token.clone(),
                amount: 0,
                unlock_round,
                active: false,
            });
        share.amount = share.amount.saturating_add(amount);
        share.unlock_round = unlock_round;
        share.active = true;
        self.contributors
            .entry(token.clone())
            .or_default()
            .insert(*contributor);
        tracing::info!(%contributor, %token, amount, unlock_round, "pool contribution credited");
        Ok(unlock_round)
    }

    /// Validate a withdrawal without mutating. The engine calls this before
    /// the outbound transfer so a transfer failure leaves no partial write.
    pub fn check_withdraw(
        &self,
        contributor: &AccountId,
        token: &TokenId,
        amount: u64,
        current_round: u64,
    ) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.pool(token)?;
        let share = self
            .share(contributor, token)
            .filter(|s| s.active)
            .ok_or_else(|| EngineError::NoActiveContribution(token.clone()))?;
        if current_round < share.unlock_round {
            return Err(EngineError::Locked {
                unlock_round: share.unlock_round,
                current_round,
            });
        }
        if amount > share.amount {
            return Err(EngineError::InsufficientAmount {
                requested: amount,
                available: share.amount,
            });
        }
        Ok(())
    }

    /// Apply a withdrawal previously validated by [`check_withdraw`].
    ///
    /// [`check_withdraw`]: PoolBook::check_withdraw
    pub fn withdraw(
        &mut self,
        contributor: &AccountId,
        token: &TokenId,
        amount: u64,
        current_round: u64,
    ) -> EngineResult<()> {
        self.check_withdraw(contributor, token, amount, current_round)?;
        self.debit_share(contributor, token, amount)?;
        tracing::info!(%contributor, %token, amount, "pool withdrawal applied");
        Ok(())
    }

    /// The refund/penalty split an emergency withdrawal would pay, without
    /// mutating. Fails if the contributor has nothing to withdraw.
    pub fn check_emergency_withdraw(
        &self,
        contributor: &AccountId,
        token: &TokenId,
        penalty_bps: u64,
    ) -> EngineResult<EmergencyPayout> {
        self.pool(token)?;
        let share = self
            .share(contributor, token)
            .filter(|s| s.active && s.amount > 0)
            .ok_or_else(|| EngineError::NoActiveContribution(token.clone()))?;
        let penalty =
            ((share.amount as u128 * penalty_bps as u128) / BPS_DENOMINATOR as u128) as u64;
        Ok(EmergencyPayout {
            refund: share.amount - penalty,
            penalty,
        })
    }

    /// Apply an emergency withdrawal: forfeits the full share and
    /// deactivates, regardless of the lock.
    pub fn emergency_withdraw(
        &mut self,
        contributor: &AccountId,
        token: &TokenId,
        penalty_bps: u64,
    ) -> EngineResult<EmergencyPayout> {
        let payout = self.check_emergency_withdraw(contributor, token, penalty_bps)?;
        let amount = payout.refund + payout.penalty;
        self.debit_share(contributor, token, amount)?;
        tracing::info!(
            %contributor, %token,
            refund = payout.refund,
            penalty = payout.penalty,
            "emergency withdrawal applied"
        );
        Ok(payout)
    }

    /// Record wager inflows: the pool share funds ordinary payouts, the
    /// jackpot share accrues to the jackpot.
    pub fn credit_wager(
        &mut self,
        token: &TokenId,
        pool_share: u64,
        jackpot_share: u64,
        wagered: u64,
    ) -> EngineResult<()> {
        let pool = self.pool_mut(token)?;
        pool.pool_balance = pool.pool_balance.saturating_add(pool_share);
        pool.jackpot_balance = pool.jackpot_balance.saturating_add(jackpot_share);
        pool.total_wagered = pool.total_wagered.saturating_add(wagered);
        Ok(())
    }

    /// Empty the jackpot and restart its cooldown clock.
    pub fn award_jackpot(&mut self, token: &TokenId, current_round: u64) -> EngineResult<u64> {
        let pool = self.pool_mut(token)?;
        let amount = pool.jackpot_balance;
        pool.jackpot_balance = 0;
        pool.last_jackpot_round = current_round;
        Ok(amount)
    }

    /// Deduct `payout` proportionally from every active contributor of
    /// `token`. Each contributor loses `floor(share * payout / total)`; the
    /// rounding remainder is then assigned one unit at a time to
    /// contributors in descending share order (ties broken by account id),
    /// skipping anyone already fully drained, so the deductions sum to
    /// exactly `payout`. Returns the per-contributor deductions.
    pub fn deduct_from_pools(
        &mut self,
        caller: &AccountId,
        token: &TokenId,
        payout: u64,
    ) -> EngineResult<Vec<(AccountId, u64)>> {
        if !self.authorized_deductors.contains(caller) {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation: "deduct_from_pools",
            });
        }
        self.pool(token)?;
        if payout == 0 {
            return Ok(Vec::new());
        }
        let total = self.total_active(token);
        if payout > total {
            return Err(EngineError::InsufficientPoolFunds {
                token: token.clone(),
                requested: payout,
                available: total,
            });
        }

        let active: Vec<(AccountId, u64)> = self
            .contributors
            .get(token)
            .map(|set| {
                set.iter()
                    .filter_map(|c| {
                        self.shares
                            .get(&(token.clone(), *c))
                            .map(|s| (*c, s.amount))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut deductions: Vec<(AccountId, u64)> = active
            .iter()
            .map(|(c, amount)| {
                let cut = ((*amount as u128 * payout as u128) / total as u128) as u64;
                (*c, cut)
            })
            .collect();
        let assigned: u64 = deductions.iter().map(|(_, d)| d).sum();
        let mut remainder = payout - assigned;

        if remainder > 0 {
            // Largest shares absorb the remainder first.
            let mut order: Vec<usize> = (0..active.len()).collect();
            order.sort_by(|&a, &b| active[b].1.cmp(&active[a].1).then(active[a].0.cmp(&active[b].0)));
            while remainder > 0 {
                let mut progressed = false;
                for &i in &order {
                    if remainder == 0 {
                        break;
                    }
                    if deductions[i].1 < active[i].1 {
                        deductions[i].1 += 1;
                        remainder -= 1;
                        progressed = true;
                    }
                }
                // payout <= total guarantees capacity exists; this guard
                // only prevents a spin on a corrupted ledger.
                if !progressed {
                    return Err(EngineError::InsufficientPoolFunds {
                        token: token.clone(),
                        requested: payout,
                        available: total,
                    });
                }
            }
        }

        for (contributor, cut) in &deductions {
            if *cut > 0 {
                self.debit_share(contributor, token, *cut)?;
            }
        }
        tracing::info!(%token, payout, contributors = deductions.len(), "proportional deduction applied");
        Ok(deductions)
    }

    /// Reduce a share and the pool balance together, deactivating and
    /// deregistering the contributor when the share reaches zero.
    fn debit_share(
        &mut self,
        contributor: &AccountId,
        token: &TokenId,
        amount: u64,
    ) -> EngineResult<()> {
        let share = self
            .shares
            .get_mut(&(token.clone(), *contributor))
            .ok_or_else(|| EngineError::NoActiveContribution(token.clone()))?;
        share.amount =
            share
                .amount
                .checked_sub(amount)
                .ok_or(EngineError::InsufficientAmount {
                    requested: amount,
                    available: share.amount,
                })?;
        if share.amount == 0 {
            share.active = false;
            if let Some(set) = self.contributors.get_mut(token) {
                set.remove(contributor);
            }
        }
        let pool = self.pool_mut(token)?;
        pool.pool_balance =
            pool.pool_balance
                .checked_sub(amount)
                .ok_or(EngineError::InsufficientPoolFunds {
                    token: token.clone(),
                    requested: amount,
                    available: pool.pool_balance,
                })?;
        Ok(())
    }
}
