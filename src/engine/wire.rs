//! Provider response shapes and their validation into typed records.
//!
//! Each external response is deserialized into a wire struct and then turned
//! into engine records here. Nothing untyped leaves this module.

use crate::engine::classifier::resolve_symbols;
use crate::engine::lenient;
use crate::types::{NetworkId, PoolRecord, PumpLaunch, TickerQuote, TradeRecord, TradeSide};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

// --- Market listing provider (pools and trades) ---

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct PoolItem {
    id: Option<String>,
    #[serde(default)]
    attributes: Option<PoolAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolAttributes {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    base_token_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    quote_token_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    reserve_in_usd: Option<f64>,
    #[serde(default)]
    volume_usd: Option<WindowedVolume>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowedVolume {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TradeItem {
    #[serde(default)]
    attributes: Option<TradeAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct TradeAttributes {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    tx_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    volume_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    side: Option<String>,
    /// Older name for `side`; used only when `side` is absent
    #[serde(default, deserialize_with = "lenient::string_opt")]
    kind: Option<String>,
}

/// Parse a pool listing body into pool records for `network`.
///
/// Items without an id are dropped; a body without a `data` array is an error.
pub fn parse_pool_listing(body: &str, network: NetworkId) -> Result<Vec<PoolRecord>> {
    let envelope: ListEnvelope<PoolItem> =
        serde_json::from_str(body).context("Malformed pool listing")?;
    let items = envelope
        .data
        .ok_or_else(|| anyhow!("Pool listing has no data array"))?;

    let pools = items
        .into_iter()
        .filter_map(|item| {
            let id = item.id?;
            let attrs = item.attributes.unwrap_or_default();
            let (base_symbol, quote_symbol) = resolve_symbols(
                attrs.base_token_symbol.as_deref(),
                attrs.quote_token_symbol.as_deref(),
                attrs.name.as_deref(),
            );
            let address = attrs
                .address
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| strip_network_prefix(&id, network));
            Some(PoolRecord {
                address,
                id,
                base_symbol,
                quote_symbol,
                liquidity_usd: attrs.reserve_in_usd,
                volume_24h_usd: attrs.volume_usd.and_then(|v| v.h24),
                network,
            })
        })
        .collect();

    Ok(pools)
}

/// Parse a trade listing body for `pool_id`. Trades without a hash are dropped.
pub fn parse_trade_listing(body: &str, pool_id: &str) -> Result<Vec<TradeRecord>> {
    let envelope: ListEnvelope<TradeItem> =
        serde_json::from_str(body).context("Malformed trade listing")?;
    let items = envelope
        .data
        .ok_or_else(|| anyhow!("Trade listing has no data array"))?;

    let trades = items
        .into_iter()
        .filter_map(|item| {
            let attrs = item.attributes?;
            let tx_hash = attrs.tx_hash.filter(|h| !h.is_empty())?;
            let side = match attrs.side.or(attrs.kind).map(|s| s.to_ascii_lowercase()).as_deref() {
                Some("buy") => TradeSide::Buy,
                _ => TradeSide::Sell,
            };
            Some(TradeRecord {
                tx_hash,
                volume_usd: attrs.volume_usd.unwrap_or(0.0),
                side,
                pool_id: pool_id.to_string(),
            })
        })
        .collect();

    Ok(trades)
}

fn strip_network_prefix(id: &str, network: NetworkId) -> String {
    let prefix = format!("{}_", network.as_path());
    id.strip_prefix(&prefix).unwrap_or(id).to_string()
}

// --- Pair-search provider ---

#[derive(Debug, Deserialize)]
struct PairEnvelope {
    #[serde(default)]
    pairs: Option<Vec<PairItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairItem {
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default, alias = "dexId")]
    dex_name: Option<String>,
    #[serde(default)]
    base_token: Option<TokenRef>,
    #[serde(default)]
    quote_token: Option<TokenRef>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    price_usd: Option<f64>,
    #[serde(default)]
    liquidity: Option<PairLiquidity>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    fdv: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    holders: Option<f64>,
    #[serde(default)]
    price_change: Option<PairPriceChange>,
}

#[derive(Debug, Deserialize)]
struct TokenRef {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairLiquidity {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PairPriceChange {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    m5: Option<f64>,
}

/// A tradeable base/quote market returned by the pair-search provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PairRecord {
    pub base_address: String,
    pub quote_address: String,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
    pub chain_id: Option<String>,
    pub dex_name: Option<String>,
    pub holders: Option<u64>,
    pub price_change_5m: Option<f64>,
}

/// Parse a pair-search body. A missing `pairs` field yields an empty list.
pub fn parse_pairs(body: &str) -> Result<Vec<PairRecord>> {
    let envelope: PairEnvelope = serde_json::from_str(body).context("Malformed pair response")?;
    let pairs = envelope
        .pairs
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let base_address = item.base_token.and_then(|t| t.address)?;
            let quote_address = item.quote_token.and_then(|t| t.address)?;
            Some(PairRecord {
                base_address,
                quote_address,
                price_usd: item.price_usd,
                liquidity_usd: item.liquidity.and_then(|l| l.usd),
                fdv: item.fdv,
                market_cap: item.market_cap,
                chain_id: item.chain_id,
                dex_name: item.dex_name,
                holders: item.holders.filter(|h| *h >= 0.0).map(|h| h as u64),
                price_change_5m: item.price_change.and_then(|c| c.m5),
            })
        })
        .collect::<Vec<_>>();

    debug!("Parsed {} pairs", pairs.len());
    Ok(pairs)
}

// --- Reference-price provider ---

#[derive(Debug, Deserialize)]
struct CoinPrice {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    usd_24h_change: Option<f64>,
}

/// Parse a reference-price body into quotes for `basket` (asset key, display symbol).
///
/// Every basket key must be present with a USD price, otherwise the whole refresh fails.
pub fn parse_ticker_prices(body: &str, basket: &[(&str, &str)]) -> Result<Vec<TickerQuote>> {
    let prices: HashMap<String, CoinPrice> =
        serde_json::from_str(body).context("Malformed reference-price response")?;

    basket
        .iter()
        .map(|(key, symbol)| {
            let entry = prices
                .get(*key)
                .ok_or_else(|| anyhow!("Reference price missing for {}", key))?;
            let price = entry
                .usd
                .ok_or_else(|| anyhow!("Reference price for {} has no USD value", key))?;
            Ok(TickerQuote {
                symbol: symbol.to_string(),
                price,
                change_percent_24h: entry.usd_24h_change.unwrap_or(0.0),
            })
        })
        .collect()
}

// --- Streaming provider ---

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default, rename = "txType")]
    tx_type: Option<String>,
    #[serde(default, rename = "tx_type")]
    tx_type_snake: Option<String>,
    #[serde(default)]
    mint: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Interpret a streaming message as a token-launch event.
///
/// Returns `None` for malformed JSON and for anything that is not a creation
/// event carrying both a mint and a symbol.
pub fn parse_launch_event(text: &str) -> Option<PumpLaunch> {
    let event: StreamEvent = serde_json::from_str(text).ok()?;
    if event.tx_type.or(event.tx_type_snake).as_deref() != Some("create") {
        return None;
    }
    let mint = event.mint.filter(|m| !m.is_empty())?;
    let symbol = event.symbol.filter(|s| !s.is_empty())?;
    let name = event
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Some(PumpLaunch {
        mint,
        symbol: symbol.to_uppercase(),
        name,
    })
}
