//! Live position tracker for the audited token.
//!
//! While an audit result with a contract address is displayed, polls the
//! pair-search provider on a fixed cadence, keeps the live market fields
//! current, and appends one price sample per successful poll.

use crate::engine::data_sources::PairSearchSource;
use crate::engine::pairs::{best_pair_for, usd_price_for};
use crate::engine::state::{EngineState, SharedState};
use crate::engine::types::LiveMarket;
use crate::engine::wire::PairRecord;
use crate::types::{now_millis, Address, PricePoint};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Market fields derived from the best pair. Market cap prefers FDV.
pub fn market_from_pair(pair: &PairRecord, price: Option<f64>) -> LiveMarket {
    let positive = |v: Option<f64>| v.filter(|x| *x > 0.0);
    LiveMarket {
        price,
        market_cap: positive(pair.fdv).or_else(|| positive(pair.market_cap)),
        liquidity_usd: positive(pair.liquidity_usd),
        chain: pair.chain_id.clone(),
        dex: pair.dex_name.clone(),
        holders: pair.holders.filter(|h| *h > 0),
        price_change_5m: pair.price_change_5m,
    }
}

/// Whether `state` is still displaying an audit for `address`.
fn still_tracking(state: &EngineState, address: &str) -> bool {
    state
        .analysis
        .as_ref()
        .and_then(|analysis| analysis.tracked_address())
        .map(|tracked| tracked.eq_ignore_ascii_case(address))
        .unwrap_or(false)
}

/// Polls one contract address until aborted.
pub struct LiveTracker {
    source: Arc<dyn PairSearchSource>,
    state: SharedState,
    address: Address,
    interval: Duration,
}

impl LiveTracker {
    pub fn new(
        source: Arc<dyn PairSearchSource>,
        state: SharedState,
        address: impl Into<Address>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            state,
            address: address.into(),
            interval,
        }
    }

    /// One poll. Returns `true` if a price sample was appended.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn poll_once(&self) -> bool {
        let pairs = match self.source.search_pairs(&self.address).await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("Live poll failed: {:#}", e);
                return false;
            }
        };

        let Some(pair) = best_pair_for(&self.address, &pairs) else {
            debug!("No pair matches {} among {} results", self.address, pairs.len());
            return false;
        };
        let price = usd_price_for(&self.address, pair);
        let market = market_from_pair(pair, price);

        let mut state = self.state.write().await;
        if !still_tracking(&state, &self.address) {
            return false;
        }
        state.live = market;
        match price {
            Some(price) => {
                state.price_history.push(PricePoint {
                    timestamp: now_millis(),
                    price,
                });
                true
            }
            None => false,
        }
    }

    pub async fn run(self) {
        info!("Live tracking {} every {}s", self.address, self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }
}
