//! Portfolio positions and their live USD prices.
//!
//! Positions are owned by an external store; the engine only subscribes to
//! them. The resolver batches every held address into one pair-search request
//! per cycle and keeps the best-liquidity price per address.

use crate::engine::data_sources::PairSearchSource;
use crate::engine::pairs::resolve_price;
use crate::engine::state::SharedState;
use crate::engine::wire::PairRecord;
use crate::types::{Address, NewPosition, PortfolioPosition};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// External document store holding the user's positions.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Append a position; the store assigns its id.
    async fn append(&self, position: NewPosition) -> Result<PortfolioPosition>;

    /// Remove a position by id.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Change stream of the full collection, newest first.
    fn subscribe(&self) -> watch::Receiver<Vec<PortfolioPosition>>;
}

/// Process-local store used when no external store is wired in.
pub struct InMemoryPositionStore {
    positions: watch::Sender<Vec<PortfolioPosition>>,
    next_id: AtomicU64,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        let (positions, _) = watch::channel(Vec::new());
        Self {
            positions,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryPositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn append(&self, position: NewPosition) -> Result<PortfolioPosition> {
        let stored = PortfolioPosition {
            id: format!("pos-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            token: position.token,
            entry_price: position.entry_price,
            risk_level: position.risk_level,
            contract_address: position.contract_address,
            created_at: position.created_at,
        };
        let inserted = stored.clone();
        self.positions.send_modify(|positions| positions.insert(0, inserted));
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut removed = false;
        self.positions.send_if_modified(|positions| {
            let before = positions.len();
            positions.retain(|p| p.id != id);
            removed = positions.len() != before;
            removed
        });
        if removed {
            Ok(())
        } else {
            Err(anyhow!("No position with id {}", id))
        }
    }

    fn subscribe(&self) -> watch::Receiver<Vec<PortfolioPosition>> {
        self.positions.subscribe()
    }
}

/// Distinct lower-cased contract addresses held in `positions`, in first-seen order.
pub fn portfolio_addresses(positions: &[PortfolioPosition]) -> Vec<Address> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .filter_map(|p| p.contract_address.as_deref())
        .map(|addr| addr.trim().to_lowercase())
        .filter(|addr| !addr.is_empty() && seen.insert(addr.clone()))
        .collect()
}

/// Resolve a USD price per address. Addresses without a usable pair are omitted.
pub fn resolve_prices(addresses: &[Address], pairs: &[PairRecord]) -> HashMap<Address, f64> {
    addresses
        .iter()
        .filter_map(|addr| resolve_price(addr, pairs).map(|price| (addr.clone(), price)))
        .collect()
}

/// Keeps `portfolio_prices` in shared state current for the held addresses.
pub struct PortfolioResolver {
    source: Arc<dyn PairSearchSource>,
    state: SharedState,
    positions: watch::Receiver<Vec<PortfolioPosition>>,
    interval: Duration,
}

impl PortfolioResolver {
    pub fn new(
        source: Arc<dyn PairSearchSource>,
        state: SharedState,
        positions: watch::Receiver<Vec<PortfolioPosition>>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            state,
            positions,
            interval,
        }
    }

    /// One resolution cycle for the current positions.
    ///
    /// An empty portfolio clears the map without a request; a failed request
    /// keeps the previous prices.
    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let addresses = portfolio_addresses(&self.positions.borrow());
        if addresses.is_empty() {
            self.state.write().await.portfolio_prices.clear();
            return;
        }

        match self.source.pairs_for_tokens(&addresses).await {
            Ok(pairs) => {
                let prices = resolve_prices(&addresses, &pairs);
                debug!("Resolved {}/{} portfolio prices", prices.len(), addresses.len());
                self.state.write().await.portfolio_prices = prices;
            }
            Err(e) => warn!("Portfolio price refresh failed: {:#}", e),
        }
    }

    /// Refresh on the fixed cadence and immediately whenever the positions change.
    pub async fn run(mut self) {
        info!("Portfolio resolver running every {}s", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        let mut store_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => self.refresh().await,
                changed = self.positions.changed(), if store_open => {
                    if changed.is_err() {
                        warn!("Position store closed; prices keep refreshing for the last known set");
                        store_open = false;
                        continue;
                    }
                    self.refresh().await;
                    interval.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryPrice;

    fn position(id: &str, address: Option<&str>) -> PortfolioPosition {
        PortfolioPosition {
            id: id.to_string(),
            token: "TKN".to_string(),
            entry_price: EntryPrice::Price(1.0),
            risk_level: "LOW".to_string(),
            contract_address: address.map(str::to_string),
            created_at: 0,
        }
    }

    #[test]
    fn test_portfolio_addresses_dedup_lowercase() {
        let positions = vec![
            position("1", Some("0xABC")),
            position("2", Some("0xabc")),
            position("3", None),
            position("4", Some("  ")),
            position("5", Some("So1Mint")),
        ];
        assert_eq!(portfolio_addresses(&positions), vec!["0xabc", "so1mint"]);
    }

    #[test]
    fn test_resolve_prices_omits_unmatched() {
        let pairs = vec![PairRecord {
            base_address: "0xAAA".to_string(),
            quote_address: "0xWETH".to_string(),
            price_usd: Some(3.0),
            liquidity_usd: Some(1_000.0),
            ..Default::default()
        }];
        let prices = resolve_prices(&["0xaaa".to_string(), "0xbbb".to_string()], &pairs);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("0xaaa"), Some(&3.0));
    }

    #[tokio::test]
    async fn test_in_memory_store_newest_first() {
        let store = InMemoryPositionStore::new();
        let rx = store.subscribe();
        let new = |token: &str| NewPosition {
            token: token.to_string(),
            entry_price: EntryPrice::Manual,
            risk_level: "LOW".to_string(),
            contract_address: None,
            created_at: 0,
        };

        let first = store.append(new("A")).await.unwrap();
        store.append(new("B")).await.unwrap();
        assert_eq!(rx.borrow().iter().map(|p| p.token.as_str()).collect::<Vec<_>>(), vec!["B", "A"]);

        store.delete(&first.id).await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
        assert!(store.delete(&first.id).await.is_err());
    }
}
