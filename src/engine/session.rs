//! Engine session: owns every component and their task lifecycle.
//!
//! `start` spawns the pollers, the ticker, the portfolio resolver and the
//! stream channel; `shutdown` closes the stream channel first so no reconnect
//! outlives the session, then cancels the rest. User operations (audit, save,
//! delete, contract-risk check) run on the caller's task and write into the
//! shared state.

use crate::engine::audit::{AuditError, AuditPipeline};
use crate::engine::classifier::{AlertClassifier, ClassifierThresholds};
use crate::engine::data_sources::ProviderSet;
use crate::engine::dedup::DedupLedger;
use crate::engine::live_tracker::LiveTracker;
use crate::engine::poller::{AlertPoller, PollKind};
use crate::engine::portfolio::{PortfolioResolver, PositionStore};
use crate::engine::state::{EngineSnapshot, EngineState, SharedState};
use crate::engine::stream::{ChannelState, StreamChannel};
use crate::engine::ticker::TickerRefresher;
use crate::engine::types::{AnalysisResult, ContractRiskReport, EngineConfig};
use crate::types::{
    now_millis, shorten_address, Alert, AlertKind, EntryPrice, NewPosition, PortfolioPosition,
};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, instrument, warn};

/// How long shutdown waits for the stream channel to send its close frame.
const STREAM_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// The market-intelligence engine for one session.
pub struct Engine {
    config: EngineConfig,
    state: SharedState,
    providers: ProviderSet,
    store: Arc<dyn PositionStore>,
    ledger: DedupLedger,
    audit: AuditPipeline,
    stream: Mutex<Option<StreamChannel>>,
    stream_status: watch::Receiver<ChannelState>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<JoinSet<()>>,
    live_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    started: AtomicBool,
    risk_check_in_flight: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, providers: ProviderSet, store: Arc<dyn PositionStore>) -> Self {
        let state = EngineState::shared(&config);
        let ledger = DedupLedger::new(config.max_seen_tx_hashes, config.max_seen_pools);
        let audit = AuditPipeline::new(
            providers.reasoning.clone(),
            config.audit_max_retries,
            config.audit_backoff_base_secs,
        );
        let stream = StreamChannel::new(
            config.stream_url.clone(),
            state.clone(),
            config.reconnect_delay,
            config.heartbeat_interval,
        );
        let stream_status = stream.status();
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            providers,
            store,
            ledger,
            audit,
            stream: Mutex::new(Some(stream)),
            stream_status,
            stream_task: Mutex::new(None),
            tasks: Mutex::new(JoinSet::new()),
            live_task: Mutex::new(None),
            shutdown_tx,
            started: AtomicBool::new(false),
            risk_check_in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the shared state, for consumers that render it live.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Observe the stream channel's connection state.
    pub fn stream_status(&self) -> watch::Receiver<ChannelState> {
        self.stream_status.clone()
    }

    /// Spawn every periodic task. Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Engine already started");
            return;
        }

        let classifier = AlertClassifier::new(self.ledger.clone(), ClassifierThresholds::from(&self.config));
        let poller = AlertPoller::new(
            self.providers.market.clone(),
            classifier,
            self.state.clone(),
            &self.config,
        );
        let ticker = TickerRefresher::new(
            self.providers.tickers.clone(),
            self.state.clone(),
            self.config.ticker_interval,
        );
        let resolver = PortfolioResolver::new(
            self.providers.pairs.clone(),
            self.state.clone(),
            self.store.subscribe(),
            self.config.portfolio_poll_interval,
        );

        {
            let mut tasks = self.tasks.lock().await;
            tasks.spawn(poller.clone().run(PollKind::Whale));
            tasks.spawn(poller.run(PollKind::NewPool));
            tasks.spawn(ticker.run());
            tasks.spawn(resolver.run());
        }

        if let Some(stream) = self.stream.lock().await.take() {
            let shutdown = self.shutdown_tx.subscribe();
            *self.stream_task.lock().await = Some(tokio::spawn(stream.run(shutdown)));
        }

        info!("Engine started on {} networks", self.config.networks.len());
    }

    /// End the session: close the stream channel, then cancel every task.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Stream channel was not running at shutdown");
        }
        if let Some(handle) = self.stream_task.lock().await.take() {
            if tokio::time::timeout(STREAM_CLOSE_GRACE, handle).await.is_err() {
                warn!("Stream channel did not close within {:?}", STREAM_CLOSE_GRACE);
            }
        }

        self.stop_live_tracker().await;

        let mut tasks = self.tasks.lock().await;
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        info!("Engine stopped");
    }

    async fn stop_live_tracker(&self) {
        if let Some(handle) = self.live_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn start_live_tracker(&self, address: &str) {
        let tracker = LiveTracker::new(
            self.providers.pairs.clone(),
            self.state.clone(),
            address,
            self.config.live_poll_interval,
        );
        let mut slot = self.live_task.lock().await;
        if let Some(previous) = slot.replace(tokio::spawn(tracker.run())) {
            previous.abort();
        }
    }

    /// Run one audit and display its result.
    ///
    /// A missing credential raises the credential prompt. A started audit
    /// clears the previous result and all live market fields first, and a
    /// result carrying a contract address starts the live tracker.
    #[instrument(skip(self))]
    pub async fn run_audit(&self, query: &str) -> Result<AnalysisResult, AuditError> {
        let ticket = match self.audit.begin(query) {
            Ok(ticket) => ticket,
            Err(AuditError::MissingCredential) => {
                self.state.write().await.credential_prompt = true;
                return Err(AuditError::MissingCredential);
            }
            Err(e) => return Err(e),
        };
        let query = ticket.query().to_string();

        self.stop_live_tracker().await;
        {
            let mut state = self.state.write().await;
            state.analysis = None;
            state.analysis_query = None;
            state.clear_market_state();
            state.push_audit_line(
                AlertKind::Audit,
                format!("INITIATING FORENSIC SCAN: {}", query.to_uppercase()),
            );
        }

        match ticket.execute().await {
            Ok(result) => {
                {
                    let mut state = self.state.write().await;
                    state.analysis = Some(result.clone());
                    state.analysis_query = Some(query);
                    state.push_audit_line(
                        AlertKind::Audit,
                        format!("AUDIT SUCCESSFUL: {} RISK", result.risk_level.as_str()),
                    );
                }
                if let Some(address) = result.tracked_address() {
                    self.start_live_tracker(address).await;
                }
                Ok(result)
            }
            Err(e) => {
                warn!("Audit failed: {}", e);
                self.state
                    .write()
                    .await
                    .push_audit_line(AlertKind::Audit, format!("ERROR: {}", e));
                Err(e)
            }
        }
    }

    /// Clear the credential prompt once the user has dealt with it.
    pub async fn acknowledge_credential_prompt(&self) {
        self.state.write().await.credential_prompt = false;
    }

    /// Hide the displayed audit result and stop live tracking.
    pub async fn dismiss_result(&self) {
        self.stop_live_tracker().await;
        let mut state = self.state.write().await;
        state.analysis = None;
        state.analysis_query = None;
    }

    /// Save the displayed audit as a portfolio position, then dismiss it.
    #[instrument(skip(self))]
    pub async fn save_position(&self) -> Result<PortfolioPosition> {
        let position = {
            let state = self.state.read().await;
            let (analysis, query) = match (&state.analysis, &state.analysis_query) {
                (Some(analysis), Some(query)) => (analysis, query),
                _ => return Err(anyhow!("No audit result to save")),
            };
            NewPosition {
                token: query.to_uppercase(),
                entry_price: analysis
                    .targets
                    .entry
                    .as_deref()
                    .map(EntryPrice::parse)
                    .unwrap_or(EntryPrice::Manual),
                risk_level: analysis.risk_level.as_str().to_string(),
                contract_address: analysis.tracked_address().map(str::to_string),
                created_at: now_millis(),
            }
        };

        let saved = match self.store.append(position).await {
            Ok(saved) => saved,
            Err(e) => {
                self.state
                    .write()
                    .await
                    .push_alert(Alert::new(AlertKind::Error, format!("Failed to log trade: {}", e)));
                return Err(e);
            }
        };

        self.state
            .write()
            .await
            .push_audit_line(AlertKind::Audit, format!("TRADE LOGGED: ${}", saved.token));
        self.dismiss_result().await;
        Ok(saved)
    }

    /// Remove a position from the external store.
    #[instrument(skip(self))]
    pub async fn delete_position(&self, id: &str) -> Result<()> {
        match self.store.delete(id).await {
            Ok(()) => {
                self.state
                    .write()
                    .await
                    .push_audit_line(AlertKind::Audit, "Position removed");
                Ok(())
            }
            Err(e) => {
                self.state.write().await.push_alert(Alert::new(
                    AlertKind::Error,
                    format!("Failed to remove position: {}", e),
                ));
                Err(e)
            }
        }
    }

    /// Check the displayed contract for honeypot/rug risk.
    ///
    /// Needs a displayed audit with a contract address and a chain resolved by
    /// the live tracker; returns `None` when those are missing, when a check is
    /// already running, or when the lookup fails.
    #[instrument(skip(self))]
    pub async fn check_contract_risk(&self) -> Option<ContractRiskReport> {
        let (address, chain) = {
            let state = self.state.read().await;
            let address = state.analysis.as_ref()?.tracked_address()?.to_string();
            let chain = state.live.chain.clone()?;
            (address, chain)
        };

        if self
            .risk_check_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        {
            let mut state = self.state.write().await;
            state.contract_risk = None;
            state.push_audit_line(
                AlertKind::Audit,
                format!("Running honeypot check on {}...", shorten_address(&address)),
            );
        }

        let outcome = self.providers.risk.check(&address, &chain).await;
        self.risk_check_in_flight.store(false, Ordering::Release);

        let mut state = self.state.write().await;
        match outcome {
            Ok(report) => {
                state.push_audit_line(
                    AlertKind::Audit,
                    format!(
                        "Honeypot check: {} {}",
                        if report.is_dangerous { "[DANGER]" } else { "[OK]" },
                        report.details
                    ),
                );
                state.contract_risk = Some(report.clone());
                Some(report)
            }
            Err(e) => {
                warn!("Contract risk check failed: {:#}", e);
                state.push_audit_line(AlertKind::Audit, format!("Honeypot check failed: {}", e));
                None
            }
        }
    }

    /// Copy of all observable state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.state.read().await.snapshot()
    }

    /// Current positions as last published by the store.
    pub fn positions(&self) -> Vec<PortfolioPosition> {
        self.store.subscribe().borrow().clone()
    }
}
