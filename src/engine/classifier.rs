//! Alert classifier.
//!
//! Turns validated pool and trade records into whale, fresh-whale and new-pool
//! alerts. Seen-membership is recorded for every examined record, whether or not
//! it crosses a threshold.

use crate::engine::dedup::DedupLedger;
use crate::engine::types::EngineConfig;
use crate::types::{Alert, AlertKind, PoolRecord, TradeRecord, TradeSide};
use tracing::{debug, instrument};

pub const UNKNOWN_BASE: &str = "UNKNOWN";
pub const UNKNOWN_QUOTE: &str = "PAIR";

/// Resolve base/quote symbols from structured fields, falling back to a
/// `"BASE / QUOTE"` display name, else the literal placeholders.
pub fn resolve_symbols(
    base: Option<&str>,
    quote: Option<&str>,
    display_name: Option<&str>,
) -> (String, String) {
    let mut base = base
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_BASE)
        .to_string();
    let mut quote = quote
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_QUOTE)
        .to_string();

    if base == UNKNOWN_BASE || quote == UNKNOWN_QUOTE {
        let parts: Vec<&str> = display_name
            .map(|name| name.split(" / ").collect())
            .unwrap_or_default();
        if parts.len() == 2 {
            base = non_empty_or(parts[0], UNKNOWN_BASE);
            quote = non_empty_or(parts[1], UNKNOWN_QUOTE);
        }
    }

    (base, quote)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Thresholds applied by the classifier (USD).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierThresholds {
    pub whale_min_volume_usd: f64,
    pub fresh_whale_max_pool_volume_usd: f64,
    pub new_pool_min_liquidity_usd: f64,
}

impl From<&EngineConfig> for ClassifierThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            whale_min_volume_usd: config.whale_min_volume_usd,
            fresh_whale_max_pool_volume_usd: config.fresh_whale_max_pool_volume_usd,
            new_pool_min_liquidity_usd: config.new_pool_min_liquidity_usd,
        }
    }
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Classifies records into alerts, consulting and updating the dedup ledger.
#[derive(Clone)]
pub struct AlertClassifier {
    ledger: DedupLedger,
    thresholds: ClassifierThresholds,
}

impl AlertClassifier {
    pub fn new(ledger: DedupLedger, thresholds: ClassifierThresholds) -> Self {
        Self { ledger, thresholds }
    }

    /// Classify one trade against its pool. Returns an alert at most once per tx hash.
    #[instrument(skip(self, pool, trade), fields(tx = %trade.tx_hash))]
    pub async fn classify_trade(&self, pool: &PoolRecord, trade: &TradeRecord) -> Option<Alert> {
        if !self.ledger.first_sighting_of_tx(&trade.tx_hash).await {
            return None;
        }
        if trade.side != TradeSide::Buy || trade.volume_usd < self.thresholds.whale_min_volume_usd {
            return None;
        }

        let kind = match pool.volume_24h_usd {
            Some(vol) if vol > 0.0 && vol < self.thresholds.fresh_whale_max_pool_volume_usd => {
                AlertKind::FreshWhale
            }
            _ => AlertKind::Whale,
        };

        let text = format!(
            "${}k buy ${} ({} • {})",
            (trade.volume_usd / 1000.0).round() as i64,
            pool.base_symbol,
            pool.pair_label(),
            pool.network.label()
        );
        debug!("Trade {} classified as {:?}", trade.tx_hash, kind);
        Some(Alert::new(kind, text))
    }

    /// Classify a newly listed pool. Returns an alert at most once per pool id.
    #[instrument(skip(self, pool), fields(pool = %pool.id))]
    pub async fn classify_new_pool(&self, pool: &PoolRecord) -> Option<Alert> {
        if !self.ledger.first_sighting_of_pool(&pool.id).await {
            return None;
        }
        let liquidity = pool.liquidity_usd.unwrap_or(0.0);
        if liquidity < self.thresholds.new_pool_min_liquidity_usd {
            return None;
        }

        let text = format!(
            "New ${} + ${}k liq ({})",
            pool.pair_label(),
            (liquidity / 1000.0).round() as i64,
            pool.network.label()
        );
        Some(Alert::new(AlertKind::Alpha, text))
    }
}
