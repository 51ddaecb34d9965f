//! Main entry point for the gem-hunter engine
//!
//! Starts a session with configuration from the environment, optionally runs
//! one audit given on the command line, and logs new alerts until Ctrl-C.

use anyhow::Result;
use gem_hunter::engine::EngineConfig;
use gem_hunter::{Alert, Engine, EngineBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

const RENDER_INTERVAL: Duration = Duration::from_secs(2);

fn log_level() -> Level {
    match std::env::var("GEM_HUNTER_LOG").ok().as_deref() {
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        Some("warn") => Level::WARN,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(log_level()).init();

    info!("Starting gem-hunter on {} networks", config.networks.len());
    if config.reasoning_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; audits will ask for a credential");
    }

    let engine = Arc::new(EngineBuilder::new().with_config(config).build()?);
    engine.start().await;

    if let Some(query) = std::env::args().nth(1) {
        let auditor = engine.clone();
        tokio::spawn(async move {
            match auditor.run_audit(&query).await {
                Ok(result) => match serde_json::to_string_pretty(&result) {
                    Ok(json) => info!("Audit result:\n{}", json),
                    Err(e) => error!("Failed to render audit result: {}", e),
                },
                Err(e) => error!("Audit failed: {}", e),
            }
        });
    }

    tokio::select! {
        _ = render_alerts(engine.clone()) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }

    info!("Shutting down");
    engine.shutdown().await;
    Ok(())
}

/// Log alert and audit lines as they are appended.
async fn render_alerts(engine: Arc<Engine>) {
    let mut last_alert: Option<Alert> = None;
    let mut last_audit: Option<Alert> = None;
    let mut interval = tokio::time::interval(RENDER_INTERVAL);

    loop {
        interval.tick().await;
        let snapshot = engine.snapshot().await;
        for alert in unseen(&snapshot.alerts, &mut last_alert) {
            info!("{}", alert);
        }
        for line in unseen(&snapshot.audit_feed, &mut last_audit) {
            info!("{}", line);
        }
    }
}

/// Entries appended after `last`; everything if `last` has been evicted.
fn unseen<'a>(entries: &'a [Alert], last: &mut Option<Alert>) -> &'a [Alert] {
    let start = last
        .as_ref()
        .and_then(|seen| entries.iter().rposition(|a| a == seen))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    if let Some(newest) = entries.last() {
        *last = Some(newest.clone());
    }
    &entries[start..]
}
