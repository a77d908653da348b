use crate::models::{PageResult, QueryOptions, SortKey, SortOrder, Token};
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Filtered and sorted collection as stored in the cache, before pagination.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CachedCollection {
    pub tokens: Vec<Token>,
    pub generated_at: i64,
}

fn is_blank(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("unknown")
}

fn first_text(first: &str, second: &str) -> String {
    if is_blank(first) { second } else { first }.to_string()
}

fn first_number(first: f64, second: f64) -> f64 {
    if first == 0.0 || !first.is_finite() {
        second
    } else {
        first
    }
}

/// Combines two records for the same address.
///
/// Identity fields keep the first usable value; market cap, volume,
/// liquidity, transaction count and timestamp take the larger one.
pub fn merge_pair(first: &Token, second: &Token) -> Token {
    Token {
        address: first.address.clone(),
        name: first_text(&first.name, &second.name),
        symbol: first_text(&first.symbol, &second.symbol),
        price: first_number(first.price, second.price),
        market_cap: first.market_cap.max(second.market_cap),
        volume_24h: first.volume_24h.max(second.volume_24h),
        liquidity: first.liquidity.max(second.liquidity),
        transactions_24h: first.transactions_24h.max(second.transactions_24h),
        price_change_1h: first_number(first.price_change_1h, second.price_change_1h),
        price_change_24h: first_number(first.price_change_24h, second.price_change_24h),
        price_change_7d: first.price_change_7d.or(second.price_change_7d),
        protocol: first_text(&first.protocol, &second.protocol),
        source: first_text(&first.source, &second.source),
        last_updated: first.last_updated.max(second.last_updated),
    }
}

/// Merges per-source batches, given in canonical source order, into one
/// record per address. Output keeps first-appearance order.
pub fn merge_tokens(batches: Vec<Vec<Token>>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for token in batches.into_iter().flatten() {
        match index.get(&token.key()) {
            Some(&position) => {
                merged[position] = merge_pair(&merged[position], &token);
            }
            None => {
                index.insert(token.key(), merged.len());
                merged.push(token);
            }
        }
    }
    merged
}

pub fn filter(tokens: Vec<Token>, options: &QueryOptions) -> Vec<Token> {
    tokens
        .into_iter()
        .filter(|t| options.min_volume.map_or(true, |min| t.volume_24h >= min))
        .filter(|t| options.min_liquidity.map_or(true, |min| t.liquidity >= min))
        .collect()
}

/// Stable sort; equal keys keep their relative order in either direction.
pub fn sort_tokens(tokens: &mut [Token], key: SortKey, order: SortOrder) {
    tokens.sort_by(|a, b| {
        let (a, b) = (key.project(a), key.project(b));
        let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

pub fn encode_cursor(offset: usize) -> String {
    hex::encode(offset.to_string())
}

pub fn decode_cursor(cursor: &str) -> Option<usize> {
    let bytes = hex::decode(cursor.trim()).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

/// Slices one page out of a sorted collection. An undecodable cursor
/// restarts from the beginning.
pub fn paginate(collection: &CachedCollection, limit: usize, cursor: Option<&str>) -> PageResult {
    let total = collection.tokens.len();
    let offset = match cursor.filter(|c| !c.trim().is_empty()) {
        Some(raw) => decode_cursor(raw).unwrap_or_else(|| {
            warn!("Ignoring undecodable cursor {:?}", raw);
            0
        }),
        None => 0,
    };

    let start = offset.min(total);
    let end = start.saturating_add(limit).min(total);
    let next_cursor = (end < total).then(|| encode_cursor(end));

    PageResult {
        tokens: collection.tokens[start..end].to_vec(),
        next_cursor,
        total_count: total,
        generated_at: collection.generated_at,
    }
}
