//! Contract-risk (honeypot) checks.
//!
//! Solana tokens go to the RugCheck summary endpoint; EVM tokens go to GoPlus
//! token security keyed by numeric chain id.

use crate::engine::data_sources::fetch_text;
use crate::engine::lenient;
use crate::engine::rate_limit::AdaptiveRateLimiter;
use crate::engine::types::ContractRiskReport;
use crate::types::NetworkId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, instrument};

const RUGCHECK_API: &str = "https://api.rugcheck.xyz/v1/tokens";
const GOPLUS_API: &str = "https://api.gopluslabs.io/api/v1/token_security";

/// Minimum locked-liquidity percentage an EVM token needs to pass.
pub const MIN_LOCKED_LIQUIDITY_PERCENT: f64 = 50.0;

/// Risk lookup for one contract on the chain its best pair trades on.
#[async_trait]
pub trait ContractRiskSource: Send + Sync {
    /// `chain` is the raw chain id reported by the pair-search provider.
    async fn check(&self, address: &str, chain: &str) -> Result<ContractRiskReport>;
}

#[derive(Debug, Default, Deserialize)]
pub struct RugCheckSummary {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub lp_burned: Value,
    #[serde(default)]
    pub mint_revoked: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoPlusTokenInfo {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub is_honeypot: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub is_open_source: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub locked_liquidity_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub buy_tax: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    pub sell_tax: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoPlusEnvelope {
    #[serde(default)]
    result: Option<HashMap<String, GoPlusTokenInfo>>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Dangerous iff the reported risk level mentions "high" or "rug".
pub fn assess_rugcheck(summary: &RugCheckSummary) -> ContractRiskReport {
    let risk = summary
        .risk_level
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string());
    ContractRiskReport {
        is_dangerous: risk.contains("high") || risk.contains("rug"),
        details: format!(
            "RugCheck: {} risk • LP burned: {} • Mint revoked: {}",
            risk,
            yes_no(truthy(&summary.lp_burned)),
            yes_no(truthy(&summary.mint_revoked))
        ),
    }
}

/// Leading numeric part of a percentage string; anything unparseable counts as zero.
fn leading_number(raw: Option<&str>) -> f64 {
    let raw = raw.unwrap_or("").trim();
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

/// Dangerous iff honeypot, closed source, or under half the liquidity locked.
pub fn assess_goplus(info: &GoPlusTokenInfo) -> ContractRiskReport {
    let locked = leading_number(info.locked_liquidity_ratio.as_deref());
    let is_dangerous = info.is_honeypot.as_deref() == Some("1")
        || info.is_open_source.as_deref() == Some("0")
        || locked < MIN_LOCKED_LIQUIDITY_PERCENT;
    let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "?".to_string());

    ContractRiskReport {
        is_dangerous,
        details: format!(
            "GoPlus: {} • LP locked: {}% • Tax: buy {}% / sell {}%",
            if is_dangerous { "HIGH RISK" } else { "Seems safe" },
            or_unknown(&info.locked_liquidity_ratio),
            or_unknown(&info.buy_tax),
            or_unknown(&info.sell_tax)
        ),
    }
}

/// EVM chain id for a pair-search chain string; unknown chains fall back to mainnet.
pub fn evm_chain_id(chain: &str) -> u64 {
    NetworkId::from_chain_id(chain)
        .and_then(|network| network.evm_chain_id())
        .unwrap_or(1)
}

/// RugCheck + GoPlus client.
pub struct RiskApiClient {
    http: Client,
    limiter: AdaptiveRateLimiter,
}

impl RiskApiClient {
    pub fn new(http: Client, requests_per_second: u32, error_window: usize) -> Self {
        Self {
            http,
            limiter: AdaptiveRateLimiter::new("contract-risk", requests_per_second, error_window),
        }
    }

    async fn rugcheck(&self, address: &str) -> Result<ContractRiskReport> {
        let url = format!("{}/{}/report/summary", RUGCHECK_API, address);
        let body = fetch_text(&self.limiter, self.http.get(&url)).await?;
        let summary: RugCheckSummary =
            serde_json::from_str(&body).context("Malformed RugCheck summary")?;
        Ok(assess_rugcheck(&summary))
    }

    async fn goplus(&self, address: &str, chain_id: u64) -> Result<ContractRiskReport> {
        let url = format!("{}/{}", GOPLUS_API, chain_id);
        let request = self.http.get(&url).query(&[("contract_addresses", address)]);
        let body = fetch_text(&self.limiter, request).await?;
        let envelope: GoPlusEnvelope =
            serde_json::from_str(&body).context("Malformed GoPlus response")?;

        let report = envelope
            .result
            .as_ref()
            .and_then(|result| result.get(&address.to_lowercase()))
            .map(assess_goplus)
            .unwrap_or_else(|| ContractRiskReport {
                is_dangerous: false,
                details: "Unknown".to_string(),
            });
        Ok(report)
    }
}

#[async_trait]
impl ContractRiskSource for RiskApiClient {
    #[instrument(skip(self))]
    async fn check(&self, address: &str, chain: &str) -> Result<ContractRiskReport> {
        if NetworkId::from_chain_id(chain) == Some(NetworkId::Solana) {
            self.rugcheck(address).await
        } else {
            let chain_id = evm_chain_id(chain);
            debug!("GoPlus lookup on chain {}", chain_id);
            self.goplus(address, chain_id).await
        }
    }
}
