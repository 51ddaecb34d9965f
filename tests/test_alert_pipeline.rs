//! Tests for the polling and classification pipeline
//!
//! Drives the multi-network poller against a scripted market source and checks
//! dedup across cycles, the fresh-whale rule, threshold boundaries and failure
//! isolation between networks.

mod common;

use common::{pool, trade, ScriptedMarket};
use gem_hunter::engine::{
    AlertClassifier, AlertPoller, ClassifierThresholds, DedupLedger, EngineConfig, EngineState,
    PollKind, SharedState,
};
use gem_hunter::types::{AlertKind, NetworkId, TradeSide};
use nonempty::NonEmpty;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn create_poller(market: Arc<ScriptedMarket>, config: &EngineConfig) -> (AlertPoller, SharedState) {
    let state = EngineState::shared(config);
    let ledger = DedupLedger::new(config.max_seen_tx_hashes, config.max_seen_pools);
    let classifier = AlertClassifier::new(ledger, ClassifierThresholds::from(config));
    (AlertPoller::new(market, classifier, state.clone(), config), state)
}

async fn alerts_of(state: &SharedState, kind: AlertKind) -> Vec<String> {
    state
        .read()
        .await
        .alerts
        .iter()
        .filter(|a| a.kind == kind)
        .map(|a| a.text.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_whale_alert_emitted_once_across_cycles() {
    let market = Arc::new(ScriptedMarket::default());
    let hot = pool(NetworkId::Solana, "HotPool", Some(80_000.0), Some(20_000.0));
    market.set_trending(NetworkId::Solana, vec![hot.clone()]);
    market.set_trades(&hot, vec![trade(&hot, "sig-1", 12_000.0, TradeSide::Buy)]);

    let config = EngineConfig::default();
    let (poller, state) = create_poller(market.clone(), &config);

    for _ in 0..5 {
        poller.poll_alerts(PollKind::Whale).await;
    }

    let whales = alerts_of(&state, AlertKind::Whale).await;
    assert_eq!(whales, vec!["$12k buy $GEM (GEM/USDC • SOLANA)".to_string()]);
    assert_eq!(market.trade_requests.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_whale_depends_on_pool_volume() {
    let market = Arc::new(ScriptedMarket::default());
    let fresh = pool(NetworkId::Base, "FreshPool", Some(30_000.0), None);
    let mature = pool(NetworkId::Base, "MaturePool", Some(80_000.0), None);
    market.set_trending(NetworkId::Base, vec![fresh.clone(), mature.clone()]);
    market.set_trades(&fresh, vec![trade(&fresh, "0xfresh", 12_000.0, TradeSide::Buy)]);
    market.set_trades(&mature, vec![trade(&mature, "0xmature", 12_000.0, TradeSide::Buy)]);

    let config = EngineConfig::default();
    let (poller, state) = create_poller(market, &config);
    poller.poll_alerts(PollKind::Whale).await;

    assert_eq!(alerts_of(&state, AlertKind::FreshWhale).await.len(), 1);
    assert_eq!(alerts_of(&state, AlertKind::Whale).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sells_and_small_buys_never_alert_later() {
    let market = Arc::new(ScriptedMarket::default());
    let p = pool(NetworkId::Ethereum, "Pool", Some(80_000.0), None);
    market.set_trending(NetworkId::Ethereum, vec![p.clone()]);
    market.set_trades(
        &p,
        vec![
            trade(&p, "0xsell", 90_000.0, TradeSide::Sell),
            trade(&p, "0xsmall", 9_999.0, TradeSide::Buy),
        ],
    );

    let config = EngineConfig::default();
    let (poller, state) = create_poller(market.clone(), &config);
    assert_eq!(poller.poll_alerts(PollKind::Whale).await, 0);

    // Same hashes reappear as qualifying buys: they were already examined.
    market.set_trades(
        &p,
        vec![
            trade(&p, "0xsell", 90_000.0, TradeSide::Buy),
            trade(&p, "0xsmall", 20_000.0, TradeSide::Buy),
        ],
    );
    assert_eq!(poller.poll_alerts(PollKind::Whale).await, 0);
    assert!(alerts_of(&state, AlertKind::Whale).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_pool_liquidity_boundary_and_dedup() {
    let market = Arc::new(ScriptedMarket::default());
    market.set_newest(
        NetworkId::Bsc,
        vec![
            pool(NetworkId::Bsc, "Below", None, Some(4_999.0)),
            pool(NetworkId::Bsc, "AtBoundary", None, Some(5_000.0)),
            pool(NetworkId::Bsc, "NoReserve", None, None),
        ],
    );

    let config = EngineConfig::default();
    let (poller, state) = create_poller(market, &config);
    assert_eq!(poller.poll_alerts(PollKind::NewPool).await, 1);
    assert_eq!(poller.poll_alerts(PollKind::NewPool).await, 0);

    let alpha = alerts_of(&state, AlertKind::Alpha).await;
    assert_eq!(alpha, vec!["New $GEM/USDC + $5k liq (BSC)".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_top_n_limits() {
    let market = Arc::new(ScriptedMarket::default());
    let trending: Vec<_> = (0..9)
        .map(|i| pool(NetworkId::Solana, &format!("T{}", i), Some(90_000.0), Some(1.0)))
        .collect();
    let newest: Vec<_> = (0..15)
        .map(|i| pool(NetworkId::Solana, &format!("N{}", i), None, Some(10_000.0)))
        .collect();
    market.set_trending(NetworkId::Solana, trending);
    market.set_newest(NetworkId::Solana, newest);

    let config = EngineConfig::default();
    let (poller, _state) = create_poller(market.clone(), &config);

    poller.poll_alerts(PollKind::Whale).await;
    assert_eq!(market.trade_requests.load(Ordering::SeqCst), 5);
    assert_eq!(poller.poll_alerts(PollKind::NewPool).await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_failing_network_is_isolated() {
    let market = Arc::new(ScriptedMarket::default());
    market.fail(NetworkId::Solana);
    market.set_newest(
        NetworkId::Base,
        vec![pool(NetworkId::Base, "Healthy", None, Some(50_000.0))],
    );

    let config = EngineConfig {
        networks: NonEmpty::from_vec(vec![NetworkId::Solana, NetworkId::Base]).unwrap(),
        ..EngineConfig::default()
    };
    let (poller, state) = create_poller(market, &config);

    assert_eq!(poller.poll_alerts(PollKind::NewPool).await, 1);
    let warnings = alerts_of(&state, AlertKind::Warning).await;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("SOLANA"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_pool_trades_skip_only_that_pool() {
    let market = Arc::new(ScriptedMarket::default());
    let pools: Vec<_> = (0..3)
        .map(|i| pool(NetworkId::Solana, &format!("P{}", i), Some(80_000.0), None))
        .collect();
    market.set_trending(NetworkId::Solana, pools.clone());
    market.fail_trades(&pools[0]);
    for p in &pools[1..] {
        market.set_trades(p, vec![trade(p, &format!("sig-{}", p.address), 20_000.0, TradeSide::Buy)]);
    }

    let config = EngineConfig {
        networks: NonEmpty::new(NetworkId::Solana),
        ..EngineConfig::default()
    };
    let (poller, state) = create_poller(market.clone(), &config);

    assert_eq!(poller.poll_alerts(PollKind::Whale).await, 2);
    assert_eq!(market.trade_requests.load(Ordering::SeqCst), 3);
    assert_eq!(alerts_of(&state, AlertKind::Whale).await.len(), 2);
    assert!(alerts_of(&state, AlertKind::Warning).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_immediately_then_on_interval() {
    let market = Arc::new(ScriptedMarket::default());
    let p = pool(NetworkId::Solana, "Pool", Some(80_000.0), None);
    market.set_trending(NetworkId::Solana, vec![p]);

    let config = EngineConfig {
        networks: NonEmpty::new(NetworkId::Solana),
        ..EngineConfig::default()
    };
    let (poller, _state) = create_poller(market.clone(), &config);
    let handle = tokio::spawn(poller.run(PollKind::Whale));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(market.trade_requests.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(market.trade_requests.load(Ordering::SeqCst), 2);

    handle.abort();
}

#[tokio::test]
async fn test_alert_feed_never_exceeds_cap() {
    let market = Arc::new(ScriptedMarket::default());
    let newest: Vec<_> = (0..10)
        .map(|i| pool(NetworkId::Base, &format!("P{}", i), None, Some(10_000.0)))
        .collect();
    market.set_newest(NetworkId::Base, newest);

    let config = EngineConfig {
        pacing_delay: Duration::ZERO,
        ..EngineConfig::default()
    };
    let (poller, state) = create_poller(market, &config);
    poller.poll_alerts(PollKind::NewPool).await;
    poller.poll_alerts(PollKind::NewPool).await;

    // two startup lines plus ten alerts
    assert_eq!(state.read().await.alerts.len(), 12);

    for i in 0..30 {
        state.write().await.push_alert(gem_hunter::types::Alert::new(
            AlertKind::System,
            format!("filler {}", i),
        ));
    }
    let state = state.read().await;
    assert_eq!(state.alerts.len(), 20);
    assert_eq!(state.alerts.last().map(|a| a.text.as_str()), Some("filler 29"));
}
