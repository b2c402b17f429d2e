//! End-to-end lifecycle tests: place, reveal, settle, and the pool ledger
//! flows around them, all against in-memory collaborators.

use fairspin::engine::{Collaborators, Engine};
use fairspin::errors::EngineError;
use fairspin::events::EngineEvent;
use fairspin::testing::{LedgerTransfers, RecordingRewards, SimulatedChain, StaticOracle};
use fairspin::types::{AccountId, TokenId};
use fairspin::EngineConfig;
use std::sync::Arc;

struct Harness {
    engine: Engine,
    chain: Arc<SimulatedChain>,
    oracle: Arc<StaticOracle>,
    transfers: Arc<LedgerTransfers>,
    rewards: Arc<RecordingRewards>,
    admin: AccountId,
    token: TokenId,
}

async fn harness_with(config: EngineConfig, start_round: u64) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let chain = Arc::new(SimulatedChain::starting_at(start_round));
    let oracle = Arc::new(StaticOracle::new());
    let transfers = Arc::new(LedgerTransfers::new());
    let rewards = Arc::new(RecordingRewards::new());
    let admin = AccountId::derive("admin");
    let token = TokenId::new("GEM");

    let engine = Engine::new(
        config,
        admin,
        Collaborators {
            rounds: chain.clone(),
            oracle: oracle.clone(),
            transfers: transfers.clone(),
            rewards: rewards.clone(),
        },
    )
    .await
    .expect("engine construction");
    engine.add_token(&admin, token.clone(), 10).await.unwrap();

    Harness {
        engine,
        chain,
        oracle,
        transfers,
        rewards,
        admin,
        token,
    }
}

async fn harness() -> Harness {
    harness_with(EngineConfig::default(), 100).await
}

/// Fund an account and make it an eligible contributor of `amount`.
async fn join_pool(h: &Harness, label: &str, amount: u64) -> AccountId {
    let account = AccountId::derive(label);
    h.oracle.set_balance(account, 1_000_000);
    h.transfers.mint(account, &h.token, amount * 2);
    h.engine
        .contribute(&account, &h.token, amount)
        .await
        .expect("contribution");
    account
}

#[tokio::test]
async fn bet_settles_exactly_once_within_the_window() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 30_000).await;
    let _bob = join_pool(&h, "bob", 70_000).await;

    let alice_before = h.transfers.balance(&alice, &h.token);
    let bet_id = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .expect("placement");
    assert_eq!(h.engine.pending_bet_count().await, 1);
    assert_eq!(h.transfers.balance(&alice, &h.token), alice_before - 100);

    // MIN_DELAY = 2: one round later is still too early.
    h.chain.advance(1);
    assert!(matches!(
        h.engine.reveal_bet(&alice, bet_id).await,
        Err(EngineError::TooEarly { .. })
    ));

    h.chain.advance(1);
    h.engine.reveal_bet(&alice, bet_id).await.expect("reveal");

    let settlements = h.engine.settlements().await;
    assert_eq!(settlements.len(), 1);
    let record = &settlements[0];
    assert_eq!(record.bet_id, bet_id);
    assert_eq!(record.symbols.len(), 4);
    assert!(record.symbols.iter().all(|&s| s < 10));
    assert!(!record.emergency);
    assert_eq!(h.engine.pending_bet_count().await, 0);

    // The winnings (if any) arrived in full.
    assert_eq!(
        h.transfers.balance(&alice, &h.token),
        alice_before - 100 + record.payout + record.jackpot
    );

    // Revealed implies fulfilled in the same observed state.
    let request = h.engine.request(record.request_id).await.unwrap();
    assert!(request.revealed && request.fulfilled);

    // A second reveal of the same bet always fails.
    assert!(matches!(
        h.engine.reveal_bet(&alice, bet_id).await,
        Err(EngineError::AlreadySettled(_))
    ));
}

#[tokio::test]
async fn stake_splits_flow_to_team_pool_jackpot_and_rewards() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 100_000).await;

    let pool_before = h.engine.pool_snapshot(&h.token).await.unwrap();
    h.engine
        .place_bet(&alice, &h.token, 1_000, 1, 2)
        .await
        .expect("placement");

    let pool = h.engine.pool_snapshot(&h.token).await.unwrap();
    // Default splits: 500/8500/300/200 bps of 1_000.
    assert_eq!(pool.pool_balance, pool_before.pool_balance + 850);
    assert_eq!(pool.jackpot_balance, pool_before.jackpot_balance + 20);
    assert_eq!(pool.total_wagered, pool_before.total_wagered + 1_000);
    assert_eq!(h.transfers.balance(&h.engine.team_account(), &h.token), 50);
    assert_eq!(h.rewards.total_for(&h.token), 30);
}

#[tokio::test]
async fn placement_is_validated_before_any_effect() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 50_000).await;
    let outsider = AccountId::derive("outsider");
    h.transfers.mint(outsider, &h.token, 10_000);

    assert!(matches!(
        h.engine
            .place_bet(&alice, &TokenId::new("DOGE"), 100, 1, 2)
            .await,
        Err(EngineError::TokenNotSupported(_))
    ));
    assert!(matches!(
        h.engine.place_bet(&alice, &h.token, 9, 1, 2).await,
        Err(EngineError::BelowMinimum { min_stake: 10, .. })
    ));
    assert!(matches!(
        h.engine.place_bet(&outsider, &h.token, 100, 1, 2).await,
        Err(EngineError::InsufficientEligibility(_))
    ));
    // Pool balance 50_000, max multiplier 100: the cap is 500.
    assert!(matches!(
        h.engine.place_bet(&alice, &h.token, 501, 1, 2).await,
        Err(EngineError::AboveMaximum { max_bet: 500, .. })
    ));
    assert_eq!(h.engine.pending_bet_count().await, 0);
}

#[tokio::test]
async fn only_the_bet_owner_may_reveal() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 30_000).await;
    let bob = join_pool(&h, "bob", 30_000).await;

    let bet_id = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .unwrap();
    h.chain.advance(2);
    assert!(matches!(
        h.engine.reveal_bet(&bob, bet_id).await,
        Err(EngineError::Unauthorized { .. })
    ));
    assert!(matches!(
        h.engine.reveal_bet(&alice, 999).await,
        Err(EngineError::UnknownBet(999))
    ));
}

#[tokio::test]
async fn expired_bets_settle_only_through_the_emergency_path() {
    let mut config = EngineConfig::default();
    config.max_reveal_delay = 5;
    let h = harness_with(config, 100).await;
    let alice = join_pool(&h, "alice", 30_000).await;
    let operator = AccountId::derive("operator");
    h.engine
        .authorize_operator(&h.admin, operator)
        .await
        .unwrap();

    let bet_id = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .unwrap();

    // Before expiry the emergency path refuses.
    h.chain.advance(3);
    assert!(matches!(
        h.engine.emergency_reveal(&operator, bet_id).await,
        Err(EngineError::NotReady { .. })
    ));

    // Past the window the owner can no longer reveal.
    h.chain.advance(3);
    assert!(matches!(
        h.engine.reveal_bet(&alice, bet_id).await,
        Err(EngineError::Expired { .. })
    ));

    // Only privileged callers may force settlement.
    assert!(matches!(
        h.engine.emergency_reveal(&alice, bet_id).await,
        Err(EngineError::Unauthorized { .. })
    ));
    h.engine
        .emergency_reveal(&operator, bet_id)
        .await
        .expect("emergency settlement");

    let settlements = h.engine.settlements().await;
    assert_eq!(settlements.len(), 1);
    assert!(settlements[0].emergency);
    assert_eq!(h.engine.pending_bet_count().await, 0);
    assert!(matches!(
        h.engine.emergency_reveal(&operator, bet_id).await,
        Err(EngineError::AlreadySettled(_))
    ));
}

#[tokio::test]
async fn failed_stake_transfer_leaves_no_trace() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 30_000).await;
    let pool_before = h.engine.pool_snapshot(&h.token).await.unwrap();
    let alice_before = h.transfers.balance(&alice, &h.token);

    h.transfers.fail_next_transfer();
    assert!(matches!(
        h.engine.place_bet(&alice, &h.token, 100, 1, 2).await,
        Err(EngineError::TransferFailed(_))
    ));

    assert_eq!(h.engine.pending_bet_count().await, 0);
    assert_eq!(h.transfers.balance(&alice, &h.token), alice_before);
    let pool = h.engine.pool_snapshot(&h.token).await.unwrap();
    assert_eq!(pool.pool_balance, pool_before.pool_balance);
    assert_eq!(pool.total_wagered, pool_before.total_wagered);
}

#[tokio::test]
async fn reward_outage_never_blocks_placement() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 30_000).await;
    h.rewards.set_failing(true);
    h.engine
        .place_bet(&alice, &h.token, 100, 1, 2)
        .await
        .expect("placement despite reward outage");
    assert_eq!(h.rewards.total_for(&h.token), 0);
}

#[tokio::test]
async fn contribution_requires_a_healthy_oracle() {
    let h = harness().await;
    let carol = AccountId::derive("carol");
    h.transfers.mint(carol, &h.token, 10_000);

    // No oracle balance.
    assert!(matches!(
        h.engine.contribute(&carol, &h.token, 1_000).await,
        Err(EngineError::NotEligible(_))
    ));

    // Oracle outage also reads as not eligible.
    h.oracle.set_balance(carol, 5_000);
    h.oracle.set_unavailable(true);
    assert!(matches!(
        h.engine.contribute(&carol, &h.token, 1_000).await,
        Err(EngineError::NotEligible(_))
    ));

    h.oracle.set_unavailable(false);
    h.engine.contribute(&carol, &h.token, 1_000).await.unwrap();
    assert_eq!(h.engine.total_active_contribution(&h.token).await, 1_000);
}

#[tokio::test]
async fn withdrawal_honors_the_lock_and_the_emergency_penalty() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 10_000).await;

    // Default lock period is 1000 rounds.
    assert!(matches!(
        h.engine.withdraw(&alice, &h.token, 1_000).await,
        Err(EngineError::Locked { .. })
    ));

    let before = h.transfers.balance(&alice, &h.token);
    h.engine
        .emergency_withdraw(&alice, &h.token)
        .await
        .expect("emergency withdrawal");

    // 10% penalty to the treasury, the rest back to the contributor.
    assert_eq!(h.transfers.balance(&alice, &h.token), before + 9_000);
    assert_eq!(
        h.transfers.balance(&h.engine.treasury_account(), &h.token),
        1_000
    );
    assert_eq!(h.engine.total_active_contribution(&h.token).await, 0);
    assert!(matches!(
        h.engine.emergency_withdraw(&alice, &h.token).await,
        Err(EngineError::NoActiveContribution(_))
    ));
}

#[tokio::test]
async fn unlocked_withdrawal_pays_out_and_deactivates_at_zero() {
    let mut config = EngineConfig::default();
    config.lock_period = 5;
    let h = harness_with(config, 100).await;
    let alice = join_pool(&h, "alice", 10_000).await;

    h.chain.advance(5);
    let before = h.transfers.balance(&alice, &h.token);
    h.engine.withdraw(&alice, &h.token, 4_000).await.unwrap();
    assert_eq!(h.transfers.balance(&alice, &h.token), before + 4_000);

    h.engine.withdraw(&alice, &h.token, 6_000).await.unwrap();
    assert!(h
        .engine
        .contributor_share(&alice, &h.token)
        .await
        .map(|s| !s.active)
        .unwrap_or(false));
}

#[tokio::test]
async fn settlement_deducts_contributors_proportionally() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 30_000).await;
    let bob = join_pool(&h, "bob", 70_000).await;

    let bet_id = h
        .engine
        .place_bet(&alice, &h.token, 500, 111, 222)
        .await
        .unwrap();
    h.chain.advance(2);
    h.engine.reveal_bet(&alice, bet_id).await.unwrap();

    let settlements = h.engine.settlements().await;
    let record = &settlements[0];
    let alice_share = h
        .engine
        .contributor_share(&alice, &h.token)
        .await
        .unwrap()
        .amount;
    let bob_share = h
        .engine
        .contributor_share(&bob, &h.token)
        .await
        .unwrap()
        .amount;

    // The deduction conserves value exactly across both contributors.
    assert_eq!(alice_share + bob_share, 100_000 - record.payout);
    // And never exceeds what the pool can fund.
    let pool = h.engine.pool_snapshot(&h.token).await.unwrap();
    assert!(alice_share + bob_share <= pool.pool_balance);
}

#[tokio::test]
async fn events_are_published_after_each_operation() {
    let h = harness().await;
    let mut rx = h.engine.subscribe();
    let alice = join_pool(&h, "alice", 30_000).await;

    let bet_id = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .unwrap();
    h.chain.advance(2);
    h.engine.reveal_bet(&alice, bet_id).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    let names: Vec<&str> = seen
        .iter()
        .map(|e| match e {
            EngineEvent::PoolContribution { .. } => "contribution",
            EngineEvent::BetPlaced { .. } => "bet_placed",
            EngineEvent::CommitmentMade { .. } => "commitment_made",
            EngineEvent::EntropyObserved { .. } => "entropy_observed",
            EngineEvent::RandomnessRevealed { .. } => "randomness_revealed",
            EngineEvent::BetSettled { .. } => "bet_settled",
            _ => "other",
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "contribution",
            "bet_placed",
            "commitment_made",
            "entropy_observed",
            "randomness_revealed",
            "bet_settled",
        ]
    );

    // The reveal events agree on the symbols that settled the bet.
    let symbols = seen.iter().find_map(|e| match e {
        EngineEvent::RandomnessRevealed { symbols, .. } => Some(symbols.clone()),
        _ => None,
    });
    let settlements = h.engine.settlements().await;
    assert_eq!(symbols.unwrap(), settlements[0].symbols);
}

#[tokio::test]
async fn identical_secrets_on_different_bets_draw_independently() {
    let h = harness().await;
    let alice = join_pool(&h, "alice", 50_000).await;

    let first = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .unwrap();
    let second = h
        .engine
        .place_bet(&alice, &h.token, 100, 111, 222)
        .await
        .unwrap();
    h.chain.advance(2);
    h.engine.reveal_bet(&alice, first).await.unwrap();
    h.chain.advance(1);
    h.engine.reveal_bet(&alice, second).await.unwrap();

    let settlements = h.engine.settlements().await;
    assert_eq!(settlements.len(), 2);
    // The per-owner nonce and request lane separate the two draws even
    // though secret and salt are identical.
    assert_ne!(settlements[0].request_id, settlements[1].request_id);
}

#[tokio::test]
async fn admin_surface_is_restricted() {
    let h = harness().await;
    let mallory = AccountId::derive("mallory");
    assert!(matches!(
        h.engine
            .add_token(&mallory, TokenId::new("DOGE"), 1)
            .await,
        Err(EngineError::Unauthorized { .. })
    ));
    assert!(matches!(
        h.engine.authorize_operator(&mallory, mallory).await,
        Err(EngineError::Unauthorized { .. })
    ));
    assert!(matches!(
        h.engine.add_token(&h.admin, h.token.clone(), 1).await,
        Err(EngineError::TokenAlreadyListed(_))
    ));
}
