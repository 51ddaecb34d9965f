//! Best-liquidity pair selection and USD price normalization.
//!
//! Shared by the portfolio resolver and the live tracker: a pair-search
//! response mixes markets for many tokens, in either base or quote position.

use crate::engine::wire::PairRecord;

/// Which side of a pair the tracked address sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
    Base,
    Quote,
}

/// Side of `pair` holding `address` (case-insensitive), if any.
pub fn side_of(address: &str, pair: &PairRecord) -> Option<PairSide> {
    if pair.base_address.eq_ignore_ascii_case(address) {
        Some(PairSide::Base)
    } else if pair.quote_address.eq_ignore_ascii_case(address) {
        Some(PairSide::Quote)
    } else {
        None
    }
}

/// Highest-liquidity pair involving `address`.
///
/// Missing liquidity counts as zero. On equal liquidity the earliest pair in
/// provider order wins.
pub fn best_pair_for<'a>(address: &str, pairs: &'a [PairRecord]) -> Option<&'a PairRecord> {
    pairs
        .iter()
        .filter(|pair| side_of(address, pair).is_some())
        .fold(None, |best: Option<&PairRecord>, pair| match best {
            Some(current)
                if pair.liquidity_usd.unwrap_or(0.0) <= current.liquidity_usd.unwrap_or(0.0) =>
            {
                Some(current)
            }
            _ => Some(pair),
        })
}

/// USD price of `address` implied by `pair`.
///
/// The pair's price is quoted for its base token, so a quote-side address gets
/// the reciprocal. Zero, missing or non-finite prices yield `None`.
pub fn usd_price_for(address: &str, pair: &PairRecord) -> Option<f64> {
    let price = pair.price_usd.filter(|p| *p > 0.0 && p.is_finite())?;
    let resolved = match side_of(address, pair)? {
        PairSide::Base => price,
        PairSide::Quote => 1.0 / price,
    };
    Some(resolved).filter(|p| *p > 0.0 && p.is_finite())
}

/// Best pair and its normalized price in one step.
pub fn resolve_price(address: &str, pairs: &[PairRecord]) -> Option<f64> {
    best_pair_for(address, pairs).and_then(|pair| usd_price_for(address, pair))
}
