//! Shared observable engine state.
//!
//! Every component writes into one `EngineState` behind a tokio `RwLock`; the
//! rendering layer only ever reads a cloned [`EngineSnapshot`].

use crate::engine::bounded::BoundedLog;
use crate::engine::types::{AnalysisResult, ContractRiskReport, EngineConfig, LiveMarket};
use crate::types::{Address, Alert, AlertKind, PricePoint, PumpLaunch, TickerQuote};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Handle to the engine state shared across tasks.
pub type SharedState = Arc<RwLock<EngineState>>;

/// All derived in-memory state owned by the engine.
#[derive(Debug)]
pub struct EngineState {
    /// Market alerts (whale, alpha, launch, stream status)
    pub alerts: BoundedLog<Alert>,
    /// Audit pipeline and portfolio action lines
    pub audit_feed: BoundedLog<Alert>,
    pub tickers: Vec<TickerQuote>,
    /// Newest first
    pub launches: BoundedLog<PumpLaunch>,
    /// Resolved USD price per lower-cased portfolio address
    pub portfolio_prices: HashMap<Address, f64>,
    pub analysis: Option<AnalysisResult>,
    /// Query that produced `analysis`
    pub analysis_query: Option<String>,
    pub live: LiveMarket,
    pub price_history: BoundedLog<PricePoint>,
    pub contract_risk: Option<ContractRiskReport>,
    /// Raised when an audit was requested without a configured credential
    pub credential_prompt: bool,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        let mut alerts = BoundedLog::new(config.alert_feed_cap);
        alerts.push(Alert::new(AlertKind::System, "Intelligence Core Online."));
        alerts.push(Alert::new(AlertKind::System, "Multi-Chain Alpha Listener: ACTIVE"));

        Self {
            alerts,
            audit_feed: BoundedLog::new(config.audit_feed_cap),
            tickers: Vec::new(),
            launches: BoundedLog::new(config.launch_list_cap),
            portfolio_prices: HashMap::new(),
            analysis: None,
            analysis_query: None,
            live: LiveMarket::default(),
            price_history: BoundedLog::new(config.price_history_cap),
            contract_risk: None,
            credential_prompt: false,
        }
    }

    /// Create a shared handle around a fresh state.
    pub fn shared(config: &EngineConfig) -> SharedState {
        Arc::new(RwLock::new(Self::new(config)))
    }

    pub fn push_alert(&mut self, alert: Alert) {
        debug!(kind = ?alert.kind, "{}", alert.text);
        self.alerts.push(alert);
    }

    pub fn push_audit_line(&mut self, kind: AlertKind, text: impl Into<String>) {
        let alert = Alert::new(kind, text);
        debug!(kind = ?alert.kind, "{}", alert.text);
        self.audit_feed.push(alert);
    }

    /// Reset every live market field before a new audit.
    pub fn clear_market_state(&mut self) {
        self.live = LiveMarket::default();
        self.price_history.clear();
        self.contract_risk = None;
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            alerts: self.alerts.to_vec(),
            audit_feed: self.audit_feed.to_vec(),
            tickers: self.tickers.clone(),
            launches: self.launches.to_vec(),
            portfolio_prices: self.portfolio_prices.clone(),
            analysis: self.analysis.clone(),
            live: self.live.clone(),
            price_history: self.price_history.to_vec(),
            contract_risk: self.contract_risk.clone(),
            credential_prompt: self.credential_prompt,
        }
    }
}

/// Point-in-time copy of the observable state for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub alerts: Vec<Alert>,
    pub audit_feed: Vec<Alert>,
    pub tickers: Vec<TickerQuote>,
    pub launches: Vec<PumpLaunch>,
    pub portfolio_prices: HashMap<Address, f64>,
    pub analysis: Option<AnalysisResult>,
    pub live: LiveMarket,
    pub price_history: Vec<PricePoint>,
    pub contract_risk: Option<ContractRiskReport>,
    pub credential_prompt: bool,
}
