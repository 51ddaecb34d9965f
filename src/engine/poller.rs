//! Rate-limited multi-network poller.
//!
//! Fetches pool listings for every configured network concurrently, sequences
//! the follow-up requests inside each network, and feeds the results through the
//! alert classifier. A pacing delay closes each network's work so one cycle never
//! bursts past the provider limits.

use crate::engine::classifier::AlertClassifier;
use crate::engine::data_sources::MarketDataSource;
use crate::engine::state::SharedState;
use crate::engine::types::EngineConfig;
use crate::types::{Alert, AlertKind, NetworkId};
use anyhow::Result;
use futures_util::future::join_all;
use nonempty::NonEmpty;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which listing a polling cycle works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    /// Trending pools plus their recent trades
    Whale,
    /// Newest pools
    NewPool,
}

/// Polls market listings and appends classified alerts to shared state.
#[derive(Clone)]
pub struct AlertPoller {
    source: Arc<dyn MarketDataSource>,
    classifier: AlertClassifier,
    state: SharedState,
    networks: NonEmpty<NetworkId>,
    pacing_delay: Duration,
    whale_top_n: usize,
    new_pool_top_n: usize,
    whale_interval: Duration,
    new_pool_interval: Duration,
}

impl AlertPoller {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        classifier: AlertClassifier,
        state: SharedState,
        config: &EngineConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            state,
            networks: config.networks.clone(),
            pacing_delay: config.pacing_delay,
            whale_top_n: config.whale_top_n,
            new_pool_top_n: config.new_pool_top_n,
            whale_interval: config.whale_poll_interval,
            new_pool_interval: config.new_pool_poll_interval,
        }
    }

    /// Run one polling cycle across all networks. Returns the number of alerts emitted.
    ///
    /// Networks run concurrently; a failing network is logged and skipped
    /// without affecting the others.
    #[instrument(skip(self))]
    pub async fn poll_alerts(&self, kind: PollKind) -> usize {
        let cycles = self
            .networks
            .iter()
            .map(|network| self.poll_network_paced(kind, *network));
        join_all(cycles).await.into_iter().sum()
    }

    async fn poll_network_paced(&self, kind: PollKind, network: NetworkId) -> usize {
        let emitted = match self.poll_network(kind, network).await {
            Ok(emitted) => emitted,
            Err(e) => {
                warn!("{:?} poll failed for {}: {:#}", kind, network, e);
                self.state.write().await.push_alert(Alert::new(
                    AlertKind::Warning,
                    format!("{} feed unavailable this cycle", network.label()),
                ));
                0
            }
        };
        tokio::time::sleep(self.pacing_delay).await;
        emitted
    }

    async fn poll_network(&self, kind: PollKind, network: NetworkId) -> Result<usize> {
        let mut emitted = 0;
        match kind {
            PollKind::Whale => {
                let pools = self.source.trending_pools(network).await?;
                for pool in pools.iter().take(self.whale_top_n) {
                    let trades = match self.source.pool_trades(pool).await {
                        Ok(trades) => trades,
                        Err(e) => {
                            warn!("Trades unavailable for pool {}: {:#}", pool.id, e);
                            continue;
                        }
                    };
                    for trade in &trades {
                        if let Some(alert) = self.classifier.classify_trade(pool, trade).await {
                            self.state.write().await.push_alert(alert);
                            emitted += 1;
                        }
                    }
                }
            }
            PollKind::NewPool => {
                let pools = self.source.new_pools(network).await?;
                for pool in pools.iter().take(self.new_pool_top_n) {
                    if let Some(alert) = self.classifier.classify_new_pool(pool).await {
                        self.state.write().await.push_alert(alert);
                        emitted += 1;
                    }
                }
            }
        }
        debug!("{:?} cycle on {} emitted {} alerts", kind, network, emitted);
        Ok(emitted)
    }

    fn interval_for(&self, kind: PollKind) -> Duration {
        match kind {
            PollKind::Whale => self.whale_interval,
            PollKind::NewPool => self.new_pool_interval,
        }
    }

    /// Poll once immediately, then on the fixed interval for `kind`.
    pub async fn run(self, kind: PollKind) {
        let period = self.interval_for(kind);
        info!("{:?} poller running every {}s", kind, period.as_secs());

        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let emitted = self.poll_alerts(kind).await;
            if emitted > 0 {
                info!("{:?} cycle emitted {} alerts", kind, emitted);
            }
        }
    }
}
