//! Ticker refresher for the reference-asset basket.

use crate::engine::data_sources::TickerSource;
use crate::engine::state::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Periodically replaces the ticker quotes in shared state.
pub struct TickerRefresher {
    source: Arc<dyn TickerSource>,
    state: SharedState,
    interval: Duration,
}

impl TickerRefresher {
    pub fn new(source: Arc<dyn TickerSource>, state: SharedState, interval: Duration) -> Self {
        Self {
            source,
            state,
            interval,
        }
    }

    /// Fetch the basket once. On any failure the previous quotes are kept.
    pub async fn refresh(&self) -> bool {
        match self.source.reference_quotes().await {
            Ok(quotes) => {
                debug!("Ticker refreshed with {} quotes", quotes.len());
                self.state.write().await.tickers = quotes;
                true
            }
            Err(e) => {
                warn!("Ticker refresh abandoned: {:#}", e);
                false
            }
        }
    }

    pub async fn run(self) {
        info!("Ticker refresher running every {}s", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            self.refresh().await;
        }
    }
}
