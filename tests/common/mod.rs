//! In-process fakes for every provider seam.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gem_hunter::engine::{
    AuditError, ContractRiskReport, ContractRiskSource, MarketDataSource, PairRecord,
    PairSearchSource, ProviderSet, ReasoningTransport, TickerSource, TransportResponse,
};
use gem_hunter::types::{Address, NetworkId, PoolRecord, TickerQuote, TradeRecord, TradeSide};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn pool(network: NetworkId, id: &str, volume_24h: Option<f64>, liquidity: Option<f64>) -> PoolRecord {
    PoolRecord {
        id: format!("{}_{}", network.as_path(), id),
        address: id.to_string(),
        base_symbol: "GEM".to_string(),
        quote_symbol: "USDC".to_string(),
        liquidity_usd: liquidity,
        volume_24h_usd: volume_24h,
        network,
    }
}

pub fn trade(pool: &PoolRecord, hash: &str, volume: f64, side: TradeSide) -> TradeRecord {
    TradeRecord {
        tx_hash: hash.to_string(),
        volume_usd: volume,
        side,
        pool_id: pool.id.clone(),
    }
}

pub fn pair(base: &str, quote: &str, price: f64, liquidity: f64) -> PairRecord {
    PairRecord {
        base_address: base.to_string(),
        quote_address: quote.to_string(),
        price_usd: Some(price),
        liquidity_usd: Some(liquidity),
        ..Default::default()
    }
}

/// Market listings keyed by network, editable between cycles.
#[derive(Default)]
pub struct ScriptedMarket {
    pub trending: Mutex<HashMap<NetworkId, Vec<PoolRecord>>>,
    pub newest: Mutex<HashMap<NetworkId, Vec<PoolRecord>>>,
    pub trades: Mutex<HashMap<String, Vec<TradeRecord>>>,
    pub failing: Mutex<HashSet<NetworkId>>,
    pub failing_pools: Mutex<HashSet<String>>,
    pub trade_requests: AtomicUsize,
}

impl ScriptedMarket {
    pub fn set_trending(&self, network: NetworkId, pools: Vec<PoolRecord>) {
        self.trending.lock().unwrap().insert(network, pools);
    }

    pub fn set_newest(&self, network: NetworkId, pools: Vec<PoolRecord>) {
        self.newest.lock().unwrap().insert(network, pools);
    }

    pub fn set_trades(&self, pool: &PoolRecord, trades: Vec<TradeRecord>) {
        self.trades.lock().unwrap().insert(pool.address.clone(), trades);
    }

    pub fn fail(&self, network: NetworkId) {
        self.failing.lock().unwrap().insert(network);
    }

    /// Make the trades request for `pool` fail.
    pub fn fail_trades(&self, pool: &PoolRecord) {
        self.failing_pools.lock().unwrap().insert(pool.address.clone());
    }
}

#[async_trait]
impl MarketDataSource for ScriptedMarket {
    async fn trending_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>> {
        if self.failing.lock().unwrap().contains(&network) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.trending.lock().unwrap().get(&network).cloned().unwrap_or_default())
    }

    async fn new_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>> {
        if self.failing.lock().unwrap().contains(&network) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.newest.lock().unwrap().get(&network).cloned().unwrap_or_default())
    }

    async fn pool_trades(&self, pool: &PoolRecord) -> Result<Vec<TradeRecord>> {
        self.trade_requests.fetch_add(1, Ordering::SeqCst);
        if self.failing_pools.lock().unwrap().contains(&pool.address) {
            return Err(anyhow!("502 Bad Gateway"));
        }
        Ok(self.trades.lock().unwrap().get(&pool.address).cloned().unwrap_or_default())
    }
}

/// Pair search returning a fixed list, recording every request.
#[derive(Default)]
pub struct StaticPairs {
    pub pairs: Mutex<Vec<PairRecord>>,
    pub batch_requests: Mutex<Vec<Vec<Address>>>,
    pub search_requests: AtomicUsize,
}

impl StaticPairs {
    pub fn new(pairs: Vec<PairRecord>) -> Self {
        Self {
            pairs: Mutex::new(pairs),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PairSearchSource for StaticPairs {
    async fn pairs_for_tokens(&self, addresses: &[Address]) -> Result<Vec<PairRecord>> {
        self.batch_requests.lock().unwrap().push(addresses.to_vec());
        Ok(self.pairs.lock().unwrap().clone())
    }

    async fn search_pairs(&self, _query: &str) -> Result<Vec<PairRecord>> {
        self.search_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.pairs.lock().unwrap().clone())
    }
}

pub struct StaticTickers;

#[async_trait]
impl TickerSource for StaticTickers {
    async fn reference_quotes(&self) -> Result<Vec<TickerQuote>> {
        Ok(vec![TickerQuote {
            symbol: "SOL".to_string(),
            price: 150.0,
            change_percent_24h: -2.0,
        }])
    }
}

/// Reasoning transport replaying scripted responses.
///
/// With a gate set, every request waits for `gate.notify_one()` before answering.
pub struct ScriptedReasoning {
    pub responses: Mutex<VecDeque<TransportResponse>>,
    pub calls: AtomicUsize,
    pub credential: bool,
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedReasoning {
    pub fn new(responses: Vec<TransportResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            credential: true,
            gate: None,
        }
    }

    pub fn without_credential() -> Self {
        Self {
            credential: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn gated(responses: Vec<TransportResponse>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(responses)
        }
    }
}

#[async_trait]
impl ReasoningTransport for ScriptedReasoning {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn send(&self, _body: &Value) -> Result<TransportResponse, AuditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AuditError::Transport("no scripted response left".to_string()))
    }
}

pub fn rate_limited() -> TransportResponse {
    TransportResponse {
        status: 429,
        body: r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#.to_string(),
    }
}

/// A 200 response whose candidate text embeds `json` inside prose.
pub fn answer(json: &str) -> TransportResponse {
    let text = format!("Here is the result: {} Let me know if you need more.", json);
    let body = serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    });
    TransportResponse {
        status: 200,
        body: body.to_string(),
    }
}

pub struct StaticRisk {
    pub report: ContractRiskReport,
    pub checks: Mutex<Vec<(String, String)>>,
}

impl StaticRisk {
    pub fn safe() -> Self {
        Self {
            report: ContractRiskReport {
                is_dangerous: false,
                details: "RugCheck: low risk • LP burned: Yes • Mint revoked: Yes".to_string(),
            },
            checks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContractRiskSource for StaticRisk {
    async fn check(&self, address: &str, chain: &str) -> Result<ContractRiskReport> {
        self.checks
            .lock()
            .unwrap()
            .push((address.to_string(), chain.to_string()));
        Ok(self.report.clone())
    }
}

/// Provider set wired to the given fakes.
pub fn providers(
    market: Arc<ScriptedMarket>,
    pairs: Arc<StaticPairs>,
    reasoning: Arc<ScriptedReasoning>,
    risk: Arc<StaticRisk>,
) -> ProviderSet {
    ProviderSet {
        market,
        pairs,
        tickers: Arc::new(StaticTickers),
        reasoning,
        risk,
    }
}
