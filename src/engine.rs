//! Bet lifecycle coordination and the engine's transactional facade.
//!
//! Every public operation executes as one serialized, all-or-nothing
//! transaction: the whole ledger state sits behind a single async mutex
//! held for the operation's full duration, so no two operations ever
//! interleave intermediate state. Inside a transaction the order is fixed:
//! validate everything, perform external transfers, then apply infallible
//! state mutation, then publish events. Settlement is a private code path
//! reachable only from the two reveal operations while the lock is held,
//! which is what makes a reveal without its fulfillment unobservable.

use crate::commitment::{
    self, commitment_digest, CommitmentRegistry, CommitmentRequest,
};
use crate::config::EngineConfig;
use crate::entropy::EntropyPool;
use crate::errors::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::outcome::{self, MatchTier};
use crate::pool::{ContributorShare, PoolBook, TokenPool};
use crate::traits::{EligibilityOracle, RewardSink, RoundSource, ValueTransfer};
use crate::types::{AccountId, RoundInfo, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// A wager waiting on its randomness request. Existence of the record is
/// the pending state; settlement removes it.
#[derive(Clone, Debug)]
pub struct PendingBet {
    pub bet_id: u64,
    pub owner: AccountId,
    pub token: TokenId,
    pub staked_amount: u64,
    pub request_id: u64,
    secret: u64,
    salt: u64,
}

/// Audit record appended once per settled bet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub bet_id: u64,
    pub request_id: u64,
    pub owner: AccountId,
    pub token: TokenId,
    pub stake: u64,
    pub payout: u64,
    pub jackpot: u64,
    pub tier: Option<MatchTier>,
    pub symbols: Vec<u8>,
    pub settled_round: u64,
    pub emergency: bool,
}

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub rounds: Arc<dyn RoundSource>,
    pub oracle: Arc<dyn EligibilityOracle>,
    pub transfers: Arc<dyn ValueTransfer>,
    pub rewards: Arc<dyn RewardSink>,
}

struct LedgerState {
    entropy: EntropyPool,
    registry: CommitmentRegistry,
    pools: PoolBook,
    bets: BTreeMap<u64, PendingBet>,
    next_bet_id: u64,
    settlements: Vec<SettlementRecord>,
    operators: BTreeSet<AccountId>,
}

/// The settlement engine.
pub struct Engine {
    config: EngineConfig,
    admin: AccountId,
    /// The engine's own identity: the bound committer on every request and
    /// the account that custodies stakes and pool funds.
    identity: AccountId,
    team_account: AccountId,
    treasury_account: AccountId,
    rounds: Arc<dyn RoundSource>,
    oracle: Arc<dyn EligibilityOracle>,
    transfers: Arc<dyn ValueTransfer>,
    rewards: Arc<dyn RewardSink>,
    events: EventBus,
    state: Mutex<LedgerState>,
}

impl Engine {
    /// Build an engine and fold the first observable round into the
    /// entropy accumulator.
    pub async fn new(
        config: EngineConfig,
        admin: AccountId,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        config.validate()?;

        let identity = AccountId::derive("fairspin:engine");
        let mut registry = CommitmentRegistry::new();
        registry.authorize_committer(identity);
        let mut pools = PoolBook::new();
        pools.authorize_deductor(identity);

        let engine = Self {
            config,
            admin,
            identity,
            team_account: AccountId::derive("fairspin:team"),
            treasury_account: AccountId::derive("fairspin:treasury"),
            rounds: collaborators.rounds,
            oracle: collaborators.oracle,
            transfers: collaborators.transfers,
            rewards: collaborators.rewards,
            events: EventBus::new(1024),
            state: Mutex::new(LedgerState {
                entropy: EntropyPool::new(),
                registry,
                pools,
                bets: BTreeMap::new(),
                next_bet_id: 1,
                settlements: Vec::new(),
                operators: BTreeSet::new(),
            }),
        };

        let round = engine.rounds.current_round().await;
        let mut st = engine.state.lock().await;
        st.entropy.observe_round(&round);
        drop(st);
        tracing::info!(round = round.id, "engine initialized");
        Ok(engine)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn identity(&self) -> AccountId {
        self.identity
    }

    pub fn team_account(&self) -> AccountId {
        self.team_account
    }

    pub fn treasury_account(&self) -> AccountId {
        self.treasury_account
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- admin ----------------------------------------------------------

    pub async fn add_token(
        &self,
        caller: &AccountId,
        token: TokenId,
        min_stake: u64,
    ) -> EngineResult<()> {
        self.require_admin(caller, "add_token")?;
        let mut st = self.state.lock().await;
        st.pools.list_token(token.clone(), min_stake)?;
        tracing::info!(%token, min_stake, "token listed");
        Ok(())
    }

    pub async fn authorize_operator(
        &self,
        caller: &AccountId,
        operator: AccountId,
    ) -> EngineResult<()> {
        self.require_admin(caller, "authorize_operator")?;
        let mut st = self.state.lock().await;
        st.operators.insert(operator);
        tracing::info!(%operator, "operator authorized");
        Ok(())
    }

    fn require_admin(&self, caller: &AccountId, operation: &'static str) -> EngineResult<()> {
        if *caller != self.admin {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation,
            });
        }
        Ok(())
    }

    // ---- pool ledger -----------------------------------------------------

    pub async fn contribute(
        &self,
        caller: &AccountId,
        token: &TokenId,
        amount: u64,
    ) -> EngineResult<()> {
        let round = self.rounds.current_round().await;
        let mut st = self.state.lock().await;
        st.pools.pool(token)?;
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        // Oracle trouble of any kind reads as "not eligible".
        let eligible = matches!(self.oracle.balance_of(caller).await, Ok(balance) if balance > 0);
        if !eligible {
            return Err(EngineError::NotEligible(*caller));
        }

        self.transfers
            .transfer(Some(caller), &self.identity, token, amount)
            .await?;

        let unlock_round = st
            .pools
            .contribute(caller, token, amount, round.id, self.config.lock_period)?;
        self.events.publish(EngineEvent::PoolContribution {
            contributor: *caller,
            token: token.clone(),
            amount,
            unlock_round,
        });
        Ok(())
    }

    pub async fn withdraw(
        &self,
        caller: &AccountId,
        token: &TokenId,
        amount: u64,
    ) -> EngineResult<()> {
        let round = self.rounds.current_round().await;
        let mut st = self.state.lock().await;
        st.pools.check_withdraw(caller, token, amount, round.id)?;

        self.transfers
            .transfer(Some(&self.identity), caller, token, amount)
            .await?;

        st.pools.withdraw(caller, token, amount, round.id)?;
        self.events.publish(EngineEvent::PoolWithdrawal {
            contributor: *caller,
            token: token.clone(),
            amount,
        });
        Ok(())
    }

    /// Exit a locked contribution immediately, forfeiting the configured
    /// penalty to the treasury.
    pub async fn emergency_withdraw(
        &self,
        caller: &AccountId,
        token: &TokenId,
    ) -> EngineResult<()> {
        let mut st = self.state.lock().await;
        let payout =
            st.pools
                .check_emergency_withdraw(caller, token, self.config.emergency_penalty_bps)?;

        if payout.penalty > 0 {
            self.transfers
                .transfer(Some(&self.identity), &self.treasury_account, token, payout.penalty)
                .await?;
        }
        if payout.refund > 0 {
            if let Err(e) = self
                .transfers
                .transfer(Some(&self.identity), caller, token, payout.refund)
                .await
            {
                // Unwind the penalty leg so the abort leaves no effect.
                if payout.penalty > 0 {
                    if let Err(unwind) = self
                        .transfers
                        .transfer(Some(&self.treasury_account), &self.identity, token, payout.penalty)
                        .await
                    {
                        tracing::error!(%caller, %token, error = %unwind, "failed to unwind penalty transfer");
                    }
                }
                return Err(e);
            }
        }

        st.pools
            .emergency_withdraw(caller, token, self.config.emergency_penalty_bps)?;
        self.events.publish(EngineEvent::PoolEmergencyWithdrawal {
            contributor: *caller,
            token: token.clone(),
            refund: payout.refund,
            penalty: payout.penalty,
        });
        Ok(())
    }

    // ---- bet lifecycle ---------------------------------------------------

    /// Place a wager: validates funds and limits, pulls the stake in,
    /// splits it, registers the commitment, and stores the pending bet.
    /// One transaction; the commitment binds the engine as owner so only
    /// the coordinator path can later reveal it.
    pub async fn place_bet(
        &self,
        caller: &AccountId,
        token: &TokenId,
        amount: u64,
        secret: u64,
        salt: u64,
    ) -> EngineResult<u64> {
        let round = self.rounds.current_round().await;
        let mut st = self.state.lock().await;

        let pool = st.pools.pool(token)?;
        if amount < pool.min_stake {
            return Err(EngineError::BelowMinimum {
                amount,
                min_stake: pool.min_stake,
            });
        }
        if !st.pools.has_active_share(caller, token) {
            return Err(EngineError::InsufficientEligibility(token.clone()));
        }
        // Cap exposure so one maximal win can never exceed pool funds.
        let max_bet = pool.pool_balance / self.config.max_multiplier();
        if amount > max_bet {
            return Err(EngineError::AboveMaximum { amount, max_bet });
        }

        let bet_id = st.next_bet_id;
        let digest = commitment_digest(secret, salt, &self.identity, bet_id);
        let split = self.config.splits.apply(amount);

        self.transfers
            .transfer(Some(caller), &self.identity, token, amount)
            .await?;
        if split.team > 0 {
            if let Err(e) = self
                .transfers
                .transfer(Some(&self.identity), &self.team_account, token, split.team)
                .await
            {
                // Unwind the stake pull so the abort leaves no effect.
                if let Err(refund) = self
                    .transfers
                    .transfer(Some(&self.identity), caller, token, amount)
                    .await
                {
                    tracing::error!(%caller, %token, amount, error = %refund, "stake refund failed after team transfer error");
                }
                return Err(e);
            }
        }

        let request_id = st
            .registry
            .commit(&self.identity, bet_id, digest, self.identity, &round)?;
        st.next_bet_id += 1;
        st.pools.credit_wager(token, split.pool, split.jackpot, amount)?;
        st.bets.insert(
            bet_id,
            PendingBet {
                bet_id,
                owner: *caller,
                token: token.clone(),
                staked_amount: amount,
                request_id,
                secret,
                salt,
            },
        );
        st.entropy.observe_round(&round);
        let accumulator_version = st.entropy.accumulator().version();
        drop(st);

        if split.reward > 0 {
            if let Err(e) = self.rewards.distribute_rewards(token, split.reward).await {
                tracing::warn!(%token, amount = split.reward, error = %e, "reward distribution failed; continuing");
            }
        }

        self.events.publish(EngineEvent::BetPlaced {
            bet_id,
            owner: *caller,
            token: token.clone(),
            amount,
            request_id,
        });
        self.events.publish(EngineEvent::CommitmentMade {
            request_id,
            bet_id,
            owner: self.identity,
            origin_round: round.id,
        });
        self.events.publish(EngineEvent::EntropyObserved {
            round_id: round.id,
            accumulator_version,
        });
        tracing::info!(bet_id, request_id, %caller, %token, amount, "bet placed");
        Ok(bet_id)
    }

    /// Reveal the stored secret for a bet and settle it in the same
    /// transaction.
    pub async fn reveal_bet(&self, caller: &AccountId, bet_id: u64) -> EngineResult<()> {
        let round = self.rounds.current_round().await;
        let mut st = self.state.lock().await;

        let bet = Self::lookup_bet(&st, bet_id)?;
        if bet.owner != *caller {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation: "reveal_bet",
            });
        }

        let request = st
            .registry
            .validate_reveal(
                bet.request_id,
                &self.identity,
                bet.secret,
                bet.salt,
                round.id,
                self.config.min_reveal_delay,
                self.config.max_reveal_delay,
            )?
            .clone();

        let user = commitment::user_lane(
            bet.secret,
            bet.salt,
            &self.identity,
            request.correlation_id,
            request.owner_nonce,
        );
        let seed = self.derive_seed(&st, &request, &round, &bet.token, Some(user))?;
        let symbols = commitment::draw_symbols(
            &seed,
            self.config.symbols_per_draw,
            self.config.symbol_range,
            request.owner_nonce,
        );
        self.settle(&mut st, bet, symbols, &round, false).await
    }

    /// Force settlement of a stuck request whose owner never revealed.
    /// Privileged, delay-gated, and weaker by construction: the draw uses
    /// environmental inputs only.
    pub async fn emergency_reveal(&self, caller: &AccountId, bet_id: u64) -> EngineResult<()> {
        let round = self.rounds.current_round().await;
        let mut st = self.state.lock().await;

        if *caller != self.admin && !st.operators.contains(caller) {
            return Err(EngineError::Unauthorized {
                caller: *caller,
                operation: "emergency_reveal",
            });
        }

        let bet = Self::lookup_bet(&st, bet_id)?;
        let request = st
            .registry
            .validate_emergency(bet.request_id, round.id, self.config.max_reveal_delay)?
            .clone();

        let seed = self.derive_seed(&st, &request, &round, &bet.token, None)?;
        let symbols = commitment::draw_symbols(
            &seed,
            self.config.symbols_per_draw,
            self.config.symbol_range,
            request.owner_nonce,
        );
        self.settle(&mut st, bet, symbols, &round, true).await
    }

    fn lookup_bet(st: &LedgerState, bet_id: u64) -> EngineResult<PendingBet> {
        match st.bets.get(&bet_id) {
            Some(bet) => Ok(bet.clone()),
            // Bet ids are allocated monotonically, so an absent id below
            // the watermark can only mean the bet was settled.
            None if bet_id >= 1 && bet_id < st.next_bet_id => {
                Err(EngineError::AlreadySettled(bet_id))
            }
            None => Err(EngineError::UnknownBet(bet_id)),
        }
    }

    fn derive_seed(
        &self,
        st: &LedgerState,
        request: &CommitmentRequest,
        round: &RoundInfo,
        token: &TokenId,
        user: Option<[u8; 32]>,
    ) -> EngineResult<[u8; 32]> {
        let chain = commitment::chain_lane(
            &st.entropy.accumulator().digest(),
            st.entropy.accumulator().version(),
            round,
        );
        let records =
            st.entropy
                .records_back_from(round.id, request.origin_round, self.config.entropy_window);
        let pool_entropy = st.pools.pool(token)?.pool_balance;
        let request_hash =
            commitment::request_lane(&records, request.request_id, pool_entropy);
        Ok(commitment::final_seed(user, chain, request_hash))
    }

    /// Fulfillment: evaluate, pay out, and retire the bet. Runs to
    /// completion inside the same transaction as the reveal that triggered
    /// it; callers hold the state lock for the whole sequence.
    async fn settle(
        &self,
        st: &mut LedgerState,
        bet: PendingBet,
        symbols: Vec<u8>,
        round: &RoundInfo,
        emergency: bool,
    ) -> EngineResult<()> {
        let tier = outcome::classify(&symbols);
        let pool = st.pools.pool(&bet.token)?;
        let raw_payout = tier
            .map(|t| outcome::payout_for(bet.staked_amount, t, &self.config.payouts))
            .unwrap_or(0);
        // Cap at what the contributors can actually fund so the deduction
        // below cannot fail and abort a half-done settlement.
        let fundable = pool.pool_balance.min(st.pools.total_active(&bet.token));
        let payout = raw_payout.min(fundable);
        let jackpot = if outcome::jackpot_due(
            tier,
            round.id,
            pool.last_jackpot_round,
            self.config.jackpot_cooldown,
            pool.jackpot_balance,
        ) {
            pool.jackpot_balance
        } else {
            0
        };

        let total_out = payout.saturating_add(jackpot);
        if total_out > 0 {
            self.transfers
                .transfer(Some(&self.identity), &bet.owner, &bet.token, total_out)
                .await?;
        }

        if payout > 0 {
            st.pools
                .deduct_from_pools(&self.identity, &bet.token, payout)?;
        }
        if jackpot > 0 {
            st.pools.award_jackpot(&bet.token, round.id)?;
        }
        st.registry.mark_settled(bet.request_id)?;
        st.bets.remove(&bet.bet_id);
        st.settlements.push(SettlementRecord {
            bet_id: bet.bet_id,
            request_id: bet.request_id,
            owner: bet.owner,
            token: bet.token.clone(),
            stake: bet.staked_amount,
            payout,
            jackpot,
            tier,
            symbols: symbols.clone(),
            settled_round: round.id,
            emergency,
        });

        self.events.publish(EngineEvent::RandomnessRevealed {
            request_id: bet.request_id,
            bet_id: bet.bet_id,
            symbols,
            emergency,
        });
        self.events.publish(EngineEvent::BetSettled {
            bet_id: bet.bet_id,
            owner: bet.owner,
            token: bet.token.clone(),
            stake: bet.staked_amount,
            payout,
            tier,
        });
        if jackpot > 0 {
            self.events.publish(EngineEvent::JackpotWon {
                bet_id: bet.bet_id,
                owner: bet.owner,
                token: bet.token.clone(),
                amount: jackpot,
                round_id: round.id,
            });
        }
        tracing::info!(
            bet_id = bet.bet_id,
            request_id = bet.request_id,
            payout,
            jackpot,
            ?tier,
            emergency,
            "bet settled"
        );
        Ok(())
    }

    // ---- read access -----------------------------------------------------

    pub async fn pool_snapshot(&self, token: &TokenId) -> EngineResult<TokenPool> {
        let st = self.state.lock().await;
        st.pools.pool(token).cloned()
    }

    pub async fn contributor_share(
        &self,
        contributor: &AccountId,
        token: &TokenId,
    ) -> Option<ContributorShare> {
        let st = self.state.lock().await;
        st.pools.share(contributor, token).cloned()
    }

    pub async fn total_active_contribution(&self, token: &TokenId) -> u64 {
        let st = self.state.lock().await;
        st.pools.total_active(token)
    }

    pub async fn request(&self, request_id: u64) -> EngineResult<CommitmentRequest> {
        let st = self.state.lock().await;
        st.registry.request(request_id).cloned()
    }

    pub async fn settlements(&self) -> Vec<SettlementRecord> {
        let st = self.state.lock().await;
        st.settlements.clone()
    }

    pub async fn pending_bet_count(&self) -> usize {
        let st = self.state.lock().await;
        st.bets.len()
    }
}
