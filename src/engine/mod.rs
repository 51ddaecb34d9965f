//! Engine module - real-time market-intelligence aggregation.
//!
//! Polled listings, the launch stream, reference prices, portfolio prices and
//! the audit pipeline all feed one shared observable state. Each component has
//! its own module; [`Engine`] owns them for the lifetime of a session.

pub mod types;
pub mod lenient;
pub mod bounded;
pub mod wire;
pub mod dedup;
pub mod classifier;
pub mod rate_limit;
pub mod data_sources;
pub mod poller;
pub mod stream;
pub mod ticker;
pub mod pairs;
pub mod portfolio;
pub mod audit;
pub mod live_tracker;
pub mod risk;
pub mod state;
pub mod session;

// Re-export main public types and the engine
pub use session::Engine;
pub use types::{
    AnalysisResult, ContractRiskReport, EngineConfig, LiveMarket, RiskLevel, Verdict,
};
pub use state::{EngineSnapshot, EngineState, SharedState};

// Re-export components for embedding or testing them individually
pub use audit::{AuditError, AuditPipeline, GeminiClient, ReasoningTransport, TransportResponse};
pub use classifier::{AlertClassifier, ClassifierThresholds};
pub use data_sources::{MarketDataSource, PairSearchSource, ProviderSet, TickerSource};
pub use dedup::DedupLedger;
pub use live_tracker::LiveTracker;
pub use poller::{AlertPoller, PollKind};
pub use portfolio::{InMemoryPositionStore, PortfolioResolver, PositionStore};
pub use rate_limit::AdaptiveRateLimiter;
pub use risk::ContractRiskSource;
pub use stream::{ChannelState, StreamChannel};
pub use ticker::TickerRefresher;
pub use wire::PairRecord;

use crate::types::NetworkId;
use nonempty::NonEmpty;
use std::sync::Arc;
use std::time::Duration;

/// Engine builder for convenient construction with sensible defaults.
pub struct EngineBuilder {
    config: EngineConfig,
    providers: Option<ProviderSet>,
    store: Option<Arc<dyn PositionStore>>,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            providers: None,
            store: None,
        }
    }

    /// Start from an existing configuration (e.g. [`EngineConfig::from_env`]).
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the polled networks.
    pub fn with_networks(mut self, networks: NonEmpty<NetworkId>) -> Self {
        self.config.networks = networks;
        self
    }

    /// Set the reasoning API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.reasoning_api_key = Some(api_key.into());
        self
    }

    /// Set the reasoning model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.reasoning_model = model.into();
        self
    }

    /// Set the streaming endpoint.
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.config.stream_url = url.into();
        self
    }

    /// Set provider rate limiting.
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.config.rate_limit_requests_per_second = requests_per_second;
        self
    }

    /// Set the stream channel's reconnect delay and heartbeat interval.
    pub fn with_stream_timing(mut self, reconnect_delay: Duration, heartbeat_interval: Duration) -> Self {
        self.config.reconnect_delay = reconnect_delay;
        self.config.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Set the whale and new-pool polling intervals.
    pub fn with_poll_intervals(mut self, whale: Duration, new_pool: Duration) -> Self {
        self.config.whale_poll_interval = whale;
        self.config.new_pool_poll_interval = new_pool;
        self
    }

    /// Set the audit retry budget and backoff base (seconds).
    pub fn with_audit_retries(mut self, max_retries: usize, backoff_base_secs: u64) -> Self {
        self.config.audit_max_retries = max_retries;
        self.config.audit_backoff_base_secs = backoff_base_secs;
        self
    }

    /// Replace the provider clients (fakes in tests, alternative backends).
    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set the external position store.
    pub fn with_position_store(mut self, store: Arc<dyn PositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the engine configuration.
    pub fn build_config(self) -> EngineConfig {
        self.config
    }

    /// Build the engine. Live HTTP clients are created unless providers were supplied.
    pub fn build(self) -> anyhow::Result<Engine> {
        let providers = match self.providers {
            Some(providers) => providers,
            None => ProviderSet::live(&self.config)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPositionStore::new()));
        Ok(Engine::new(self.config, providers, store))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
