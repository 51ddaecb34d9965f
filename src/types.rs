//! Core types and data structures for the gem-hunter market engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A contract or mint address (kept as a string so EVM and Solana share one type)
pub type Address = String;

/// Current millisecond UTC timestamp used on alerts and price samples.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Shorten an address to `AbCdEf...wxyz` for alert text.
pub fn shorten_address(addr: &str) -> String {
    let chars: Vec<char> = addr.chars().collect();
    if chars.len() <= 10 {
        return addr.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Chains the engine polls for pool and trade activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Solana,
    Base,
    Ethereum,
    Bsc,
}

impl NetworkId {
    /// Path segment used by the market listing provider.
    pub fn as_path(&self) -> &'static str {
        match self {
            NetworkId::Solana => "solana",
            NetworkId::Base => "base",
            NetworkId::Ethereum => "eth",
            NetworkId::Bsc => "bsc",
        }
    }

    /// Upper-case label used in alert text.
    pub fn label(&self) -> &'static str {
        match self {
            NetworkId::Solana => "SOLANA",
            NetworkId::Base => "BASE",
            NetworkId::Ethereum => "ETH",
            NetworkId::Bsc => "BSC",
        }
    }

    /// Numeric EVM chain id, `None` for Solana.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            NetworkId::Solana => None,
            NetworkId::Base => Some(8453),
            NetworkId::Ethereum => Some(1),
            NetworkId::Bsc => Some(56),
        }
    }

    /// Map a pair-search `chainId` string back to a network, if supported.
    pub fn from_chain_id(chain: &str) -> Option<NetworkId> {
        match chain.to_ascii_lowercase().as_str() {
            "solana" => Some(NetworkId::Solana),
            "base" => Some(NetworkId::Base),
            "ethereum" | "eth" => Some(NetworkId::Ethereum),
            "bsc" => Some(NetworkId::Bsc),
            _ => None,
        }
    }

    /// Returns all supported networks in polling order.
    pub fn all() -> Vec<NetworkId> {
        vec![
            NetworkId::Solana,
            NetworkId::Base,
            NetworkId::Ethereum,
            NetworkId::Bsc,
        ]
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A liquidity pool as listed by the market provider, after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Provider pool identifier (dedup key)
    pub id: String,
    /// Pool address used for follow-up trade requests
    pub address: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    /// Reserve in USD; `None` when the provider omits it
    pub liquidity_usd: Option<f64>,
    /// 24h volume in USD; `None` when the provider omits it
    pub volume_24h_usd: Option<f64>,
    pub network: NetworkId,
}

impl PoolRecord {
    /// `BASE/QUOTE` label used in alert text.
    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.base_symbol, self.quote_symbol)
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single trade against a pool. Identity key is `tx_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tx_hash: String,
    pub volume_usd: f64,
    pub side: TradeSide,
    pub pool_id: String,
}

/// Classification tag carried by every alert line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Whale,
    FreshWhale,
    Alpha,
    Launch,
    System,
    Error,
    Warning,
    /// Untagged audit feed line
    Audit,
}

impl AlertKind {
    /// Bracketed tag rendered in front of the alert text.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            AlertKind::Whale => Some("[WHALE]"),
            AlertKind::FreshWhale => Some("[FRESH WHALE]"),
            AlertKind::Alpha => Some("[ALPHA]"),
            AlertKind::Launch => Some("[PUMP LAUNCH]"),
            AlertKind::System => Some("[SYSTEM]"),
            AlertKind::Error => Some("[ERROR]"),
            AlertKind::Warning => Some("[WARNING]"),
            AlertKind::Audit => None,
        }
    }
}

/// One classified, loggable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub text: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

impl Alert {
    pub fn new(kind: AlertKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: now_millis(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.tag() {
            Some(tag) => write!(f, "> {} {}", tag, self.text),
            None => write!(f, "> {}", self.text),
        }
    }
}

/// A freshly created token seen on the streaming channel. Identity is `mint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpLaunch {
    pub mint: Address,
    pub symbol: String,
    pub name: String,
}

/// Reference-asset quote shown in the ticker strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerQuote {
    pub symbol: String,
    pub price: f64,
    pub change_percent_24h: f64,
}

/// One live price sample for the displayed token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    pub price: f64,
}

/// Entry price of a saved position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntryPrice {
    Price(f64),
    /// No numeric entry was known when the position was saved
    Manual,
}

impl EntryPrice {
    /// Parse a model-provided target like `"$0.0012"` or `"0.5 - 0.6"`.
    /// Anything without a leading positive number is treated as manual.
    pub fn parse(raw: &str) -> EntryPrice {
        let trimmed = raw.trim().trim_start_matches('$').trim();
        let numeric: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == 'e' || *c == 'E' || *c == '-')
            .collect();
        match numeric.parse::<f64>() {
            Ok(price) if price > 0.0 && price.is_finite() => EntryPrice::Price(price),
            _ => EntryPrice::Manual,
        }
    }

    pub fn as_price(&self) -> Option<f64> {
        match self {
            EntryPrice::Price(p) => Some(*p),
            EntryPrice::Manual => None,
        }
    }
}

/// A position saved to the external store. The engine only reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    /// Store-assigned identifier
    pub id: String,
    pub token: String,
    pub entry_price: EntryPrice,
    pub risk_level: String,
    pub contract_address: Option<Address>,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
}

impl PortfolioPosition {
    /// Profit/loss in percent against the resolved current price.
    ///
    /// Returns `None` for manual entries or when no price was resolved for the address.
    pub fn pnl_percent(&self, prices: &HashMap<Address, f64>) -> Option<f64> {
        let entry = self.entry_price.as_price()?;
        let address = self.contract_address.as_ref()?.to_lowercase();
        let current = prices.get(&address)?;
        Some((current / entry - 1.0) * 100.0)
    }
}

/// Position data submitted to the store before it assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    pub token: String,
    pub entry_price: EntryPrice,
    pub risk_level: String,
    pub contract_address: Option<Address>,
    pub created_at: u64,
}
