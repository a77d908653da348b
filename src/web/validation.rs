use crate::error::{Error, Result};
use crate::models::{QueryOptions, SortKey, SortOrder};
use crate::utils::{Cache, CacheStore};
use log::warn;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn parse_field<T: FromStr>(query: &HashMap<String, String>, name: &str) -> Result<Option<T>> {
    match query.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::ValidationError(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}

fn threshold(query: &HashMap<String, String>, name: &str) -> Result<Option<f64>> {
    let value: Option<f64> = parse_field(query, name)?;
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::ValidationError(format!(
            "{} must be a non-negative number",
            name
        ))),
        other => Ok(other),
    }
}

/// Builds listing options from raw query parameters.
pub fn parse_query_options(query: &HashMap<String, String>) -> Result<QueryOptions> {
    let limit: Option<usize> = parse_field(query, "limit")?;
    if limit == Some(0) {
        return Err(Error::ValidationError("limit must be at least 1".into()));
    }

    Ok(QueryOptions {
        limit,
        cursor: query.get("cursor").cloned().filter(|c| !c.trim().is_empty()),
        sort_by: query.get("sort_by").map(|v| SortKey::parse(v)),
        sort_order: query.get("sort_order").map(|v| SortOrder::parse(v)),
        min_volume: threshold(query, "min_volume")?,
        min_liquidity: threshold(query, "min_liquidity")?,
    })
}

pub fn search_query(query: &HashMap<String, String>) -> Result<String> {
    query
        .get("q")
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::ValidationError("query parameter `q` is required".into()))
}

/// Fixed-window request counter per client, kept in the cache store under
/// `ratelimit:<client>`. The store being unavailable lets requests through.
pub struct InboundRateLimiter {
    counters: Cache,
    max_requests: u32,
    window: Duration,
}

impl InboundRateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            counters: Cache::new(store, "ratelimit", window),
            max_requests,
            window,
        }
    }

    pub async fn check(&self, client: &str) -> bool {
        match self.counters.incr(client, self.window).await {
            Some(count) if count > i64::from(self.max_requests) => {
                warn!("Rate limit exceeded for {}", client);
                false
            }
            _ => true,
        }
    }
}
