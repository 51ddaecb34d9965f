//! Data sources for market listings, pair search and reference prices.
//!
//! Each provider sits behind an async trait so the pollers can be driven by
//! in-process fakes; the reqwest-backed implementations here talk to the real
//! public APIs through a per-provider adaptive rate limiter.

use crate::engine::audit::{GeminiClient, ReasoningTransport};
use crate::engine::rate_limit::AdaptiveRateLimiter;
use crate::engine::risk::{ContractRiskSource, RiskApiClient};
use crate::engine::types::EngineConfig;
use crate::engine::wire::{self, PairRecord};
use crate::types::{Address, NetworkId, PoolRecord, TickerQuote, TradeRecord};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument};

const GECKO_TERMINAL_API: &str = "https://api.geckoterminal.com/api/v2";
const DEXSCREENER_API: &str = "https://api.dexscreener.com/latest/dex";
const COINGECKO_PRICE_API: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Reference assets shown in the ticker: (provider key, display symbol).
pub const TICKER_BASKET: [(&str, &str); 3] = [
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("solana", "SOL"),
];

/// Pool and trade listings per network.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Trending pools for a network, in provider order.
    async fn trending_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>>;

    /// Newest pools for a network, in provider order.
    async fn new_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>>;

    /// Recent trades for one pool.
    async fn pool_trades(&self, pool: &PoolRecord) -> Result<Vec<TradeRecord>>;
}

/// Pair search by token address list or free-text query.
#[async_trait]
pub trait PairSearchSource: Send + Sync {
    /// Pairs involving any of `addresses`, fetched in one batched request.
    async fn pairs_for_tokens(&self, addresses: &[Address]) -> Result<Vec<PairRecord>>;

    /// Pairs matching a free-text query (typically a contract address).
    async fn search_pairs(&self, query: &str) -> Result<Vec<PairRecord>>;
}

/// Reference-asset prices for the ticker strip.
#[async_trait]
pub trait TickerSource: Send + Sync {
    async fn reference_quotes(&self) -> Result<Vec<TickerQuote>>;
}

/// Every external provider the engine talks to.
#[derive(Clone)]
pub struct ProviderSet {
    pub market: Arc<dyn MarketDataSource>,
    pub pairs: Arc<dyn PairSearchSource>,
    pub tickers: Arc<dyn TickerSource>,
    pub reasoning: Arc<dyn ReasoningTransport>,
    pub risk: Arc<dyn ContractRiskSource>,
}

impl ProviderSet {
    /// Build reqwest-backed clients for all providers.
    pub fn live(config: &EngineConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let rps = config.rate_limit_requests_per_second;
        let window = config.rate_limit_error_window;

        Ok(Self {
            market: Arc::new(GeckoTerminalClient::new(http.clone(), rps, window)),
            pairs: Arc::new(DexScreenerClient::new(http.clone(), rps, window)),
            tickers: Arc::new(CoinGeckoClient::new(http.clone(), rps, window)),
            reasoning: Arc::new(GeminiClient::new(
                http.clone(),
                config.reasoning_api_key.clone(),
                config.reasoning_model.clone(),
            )),
            risk: Arc::new(RiskApiClient::new(http, rps, window)),
        })
    }
}

/// Fetch a body through the limiter, treating any non-2xx status as an error.
pub(crate) async fn fetch_text(
    limiter: &AdaptiveRateLimiter,
    request: reqwest::RequestBuilder,
) -> Result<String> {
    limiter.acquire().await;

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            limiter.record_failure().await;
            return Err(anyhow!(e).context("Request failed"));
        }
    };

    let status = response.status();
    if !status.is_success() {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            limiter.record_failure().await;
        }
        return Err(anyhow!("Provider returned {}", status));
    }

    let body = response.text().await.context("Failed to read response body")?;
    limiter.record_success().await;
    Ok(body)
}

/// Market listing client (GeckoTerminal API).
pub struct GeckoTerminalClient {
    http: Client,
    base_url: String,
    limiter: AdaptiveRateLimiter,
}

impl GeckoTerminalClient {
    pub fn new(http: Client, requests_per_second: u32, error_window: usize) -> Self {
        Self {
            http,
            base_url: GECKO_TERMINAL_API.to_string(),
            limiter: AdaptiveRateLimiter::new("geckoterminal", requests_per_second, error_window),
        }
    }

    async fn get_pools(&self, network: NetworkId, endpoint: &str) -> Result<Vec<PoolRecord>> {
        let url = format!("{}/networks/{}/{}", self.base_url, network.as_path(), endpoint);
        let body = fetch_text(&self.limiter, self.http.get(&url)).await?;
        let pools = wire::parse_pool_listing(&body, network)?;
        debug!("Fetched {} pools from {}", pools.len(), url);
        Ok(pools)
    }
}

#[async_trait]
impl MarketDataSource for GeckoTerminalClient {
    #[instrument(skip(self))]
    async fn trending_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>> {
        self.get_pools(network, "trending_pools").await
    }

    #[instrument(skip(self))]
    async fn new_pools(&self, network: NetworkId) -> Result<Vec<PoolRecord>> {
        self.get_pools(network, "new_pools?page=1").await
    }

    #[instrument(skip(self, pool), fields(pool = %pool.id))]
    async fn pool_trades(&self, pool: &PoolRecord) -> Result<Vec<TradeRecord>> {
        let url = format!(
            "{}/networks/{}/pools/{}/trades",
            self.base_url,
            pool.network.as_path(),
            pool.address
        );
        let body = fetch_text(&self.limiter, self.http.get(&url)).await?;
        wire::parse_trade_listing(&body, &pool.id)
    }
}

/// Pair-search client (DexScreener API).
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    limiter: AdaptiveRateLimiter,
}

impl DexScreenerClient {
    pub fn new(http: Client, requests_per_second: u32, error_window: usize) -> Self {
        Self {
            http,
            base_url: DEXSCREENER_API.to_string(),
            limiter: AdaptiveRateLimiter::new("dexscreener", requests_per_second, error_window),
        }
    }
}

#[async_trait]
impl PairSearchSource for DexScreenerClient {
    #[instrument(skip(self), fields(count = addresses.len()))]
    async fn pairs_for_tokens(&self, addresses: &[Address]) -> Result<Vec<PairRecord>> {
        let url = format!("{}/tokens/{}", self.base_url, addresses.join(","));
        let body = fetch_text(&self.limiter, self.http.get(&url)).await?;
        wire::parse_pairs(&body)
    }

    #[instrument(skip(self))]
    async fn search_pairs(&self, query: &str) -> Result<Vec<PairRecord>> {
        let url = format!("{}/search", self.base_url);
        let request = self.http.get(&url).query(&[("q", query)]);
        let body = fetch_text(&self.limiter, request).await?;
        wire::parse_pairs(&body)
    }
}

/// Reference-price client (CoinGecko simple price API).
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    limiter: AdaptiveRateLimiter,
}

impl CoinGeckoClient {
    pub fn new(http: Client, requests_per_second: u32, error_window: usize) -> Self {
        Self {
            http,
            base_url: COINGECKO_PRICE_API.to_string(),
            limiter: AdaptiveRateLimiter::new("coingecko", requests_per_second, error_window),
        }
    }
}

#[async_trait]
impl TickerSource for CoinGeckoClient {
    #[instrument(skip(self))]
    async fn reference_quotes(&self) -> Result<Vec<TickerQuote>> {
        let ids = TICKER_BASKET
            .iter()
            .map(|(key, _)| *key)
            .collect::<Vec<_>>()
            .join(",");
        let request = self.http.get(&self.base_url).query(&[
            ("ids", ids.as_str()),
            ("vs_currencies", "usd"),
            ("include_24hr_change", "true"),
        ]);
        let body = fetch_text(&self.limiter, request).await?;
        wire::parse_ticker_prices(&body, &TICKER_BASKET)
    }
}
