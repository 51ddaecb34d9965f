//! Engine configuration and audit/market result types.

use crate::engine::lenient;
use crate::types::{Address, NetworkId};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default reasoning model used by the audit pipeline.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Default streaming endpoint for token-creation events.
pub const DEFAULT_STREAM_URL: &str = "wss://pumpportal.fun/api/data";

/// Engine configuration. Every interval, cap and threshold lives here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Networks polled for pools and trades, in order
    pub networks: NonEmpty<NetworkId>,
    /// Reasoning API key; `None` means audits surface a missing-credential state
    pub reasoning_api_key: Option<String>,
    /// Reasoning model name
    pub reasoning_model: String,
    /// Streaming endpoint URL
    pub stream_url: String,
    /// Provider requests per second before the governor limiter delays
    pub rate_limit_requests_per_second: u32,
    /// Window size for the adaptive rate limiter's error rate
    pub rate_limit_error_window: usize,
    /// HTTP request timeout
    pub http_timeout: Duration,

    // Poller
    pub whale_poll_interval: Duration,
    pub new_pool_poll_interval: Duration,
    pub pacing_delay: Duration,
    pub whale_top_n: usize,
    pub new_pool_top_n: usize,

    // Classifier thresholds (USD)
    pub whale_min_volume_usd: f64,
    pub fresh_whale_max_pool_volume_usd: f64,
    pub new_pool_min_liquidity_usd: f64,

    // Dedup capacities
    pub max_seen_tx_hashes: u64,
    pub max_seen_pools: u64,

    // Streaming channel
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,

    // Other pollers
    pub ticker_interval: Duration,
    pub portfolio_poll_interval: Duration,
    pub live_poll_interval: Duration,

    // Audit pipeline
    pub audit_max_retries: usize,
    /// Base of the exponential backoff in seconds (delay = base^retry)
    pub audit_backoff_base_secs: u64,

    // Bounded state
    pub alert_feed_cap: usize,
    pub audit_feed_cap: usize,
    pub launch_list_cap: usize,
    pub price_history_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            networks: NonEmpty::from_vec(NetworkId::all())
                .unwrap_or_else(|| NonEmpty::new(NetworkId::Solana)),
            reasoning_api_key: None,
            reasoning_model: DEFAULT_MODEL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            rate_limit_requests_per_second: 10,
            rate_limit_error_window: 50,
            http_timeout: Duration::from_secs(10),
            whale_poll_interval: Duration::from_secs(30),
            new_pool_poll_interval: Duration::from_secs(45),
            pacing_delay: Duration::from_millis(300),
            whale_top_n: 5,
            new_pool_top_n: 10,
            whale_min_volume_usd: 10_000.0,
            fresh_whale_max_pool_volume_usd: 50_000.0,
            new_pool_min_liquidity_usd: 5_000.0,
            max_seen_tx_hashes: 500_000,
            max_seen_pools: 100_000,
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            ticker_interval: Duration::from_secs(60),
            portfolio_poll_interval: Duration::from_secs(15),
            live_poll_interval: Duration::from_secs(10),
            audit_max_retries: 5,
            audit_backoff_base_secs: 2,
            alert_feed_cap: 20,
            audit_feed_cap: 15,
            launch_list_cap: 10,
            price_history_cap: 50,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        config.reasoning_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.reasoning_model = model;
            }
        }
        if let Ok(url) = std::env::var("GEM_HUNTER_STREAM_URL") {
            if !url.trim().is_empty() {
                config.stream_url = url;
            }
        }
        if let Some(rps) = std::env::var("GEM_HUNTER_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            config.rate_limit_requests_per_second = rps;
        }

        config
    }
}

/// Risk level assigned by an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }
}

/// Verdict assigned by an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "STRONG BUY")]
    StrongBuy,
    #[serde(rename = "WATCH")]
    Watch,
    #[serde(rename = "AVOID")]
    Avoid,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevProfile {
    #[serde(deserialize_with = "lenient::string_opt")]
    pub reputation: Option<String>,
    #[serde(deserialize_with = "lenient::string_opt")]
    pub history: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialSentiment {
    #[serde(deserialize_with = "lenient::string_opt")]
    pub vibe: Option<String>,
    #[serde(deserialize_with = "lenient::string_opt")]
    pub platform_highs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    #[serde(deserialize_with = "lenient::string_opt")]
    pub entry: Option<String>,
    #[serde(deserialize_with = "lenient::string_opt")]
    pub exit: Option<String>,
}

/// Structured result extracted from the reasoning API's free-form answer.
///
/// Every field is optional on the wire; missing fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(deserialize_with = "lenient::tag_or_default")]
    pub risk_level: RiskLevel,
    #[serde(deserialize_with = "lenient::tag_or_default")]
    pub verdict: Verdict,
    #[serde(deserialize_with = "lenient::f64_opt")]
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "lenient::string_opt")]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "lenient::object_or_default")]
    pub dev_profile: DevProfile,
    #[serde(deserialize_with = "lenient::object_or_default")]
    pub social_sentiment: SocialSentiment,
    #[serde(deserialize_with = "lenient::string_list")]
    pub findings: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub red_flags: Vec<String>,
    #[serde(deserialize_with = "lenient::object_or_default")]
    pub targets: Targets,
}

impl AnalysisResult {
    /// Contract address if the model reported a non-empty one.
    pub fn tracked_address(&self) -> Option<&str> {
        self.contract_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

/// Live market fields for the displayed token. Cleared at the start of every audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveMarket {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub liquidity_usd: Option<f64>,
    /// Raw chain id reported by the pair-search provider
    pub chain: Option<String>,
    pub dex: Option<String>,
    pub holders: Option<u64>,
    pub price_change_5m: Option<f64>,
}

/// Outcome of a contract-risk (honeypot) check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRiskReport {
    pub is_dangerous: bool,
    pub details: String,
}
