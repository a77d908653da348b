use crate::config::{Config, SourceConfig};
use crate::error::{Error, Result};
use crate::models::Token;
use crate::utils::{retry, RetryPolicy};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub mod dexscreener;
pub mod geckoterminal;
pub mod rate_limiter;
pub mod types;

pub use dexscreener::DexScreenerClient;
pub use geckoterminal::GeckoTerminalClient;
pub use rate_limiter::RateLimiter;

/// One upstream market data provider translated into canonical tokens.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_all(&self) -> Result<Vec<Token>>;

    async fn search(&self, query: &str) -> Result<Vec<Token>>;

    /// Zero or one token; providers listing several pairs keep the deepest one.
    async fn fetch_by_address(&self, address: &str) -> Result<Vec<Token>>;
}

/// Rate-limited, retrying GET client shared by the adapters.
#[derive(Debug)]
pub struct Upstream {
    name: &'static str,
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl Upstream {
    pub fn new(name: &'static str, config: &SourceConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("token-aggregator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(name, config.max_requests, config.window()),
            retry,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for a rate limit slot, then GETs `path` inside the retry wrapper.
    pub async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let label = format!("{} GET {}", self.name, path);
        let client = &self.client;
        let provider = self.name;
        let url = url.as_str();

        retry(&self.retry, &label, move || async move {
            let response = client.get(url).query(params).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::UpstreamStatus {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                });
            }
            let body: Value = response.json().await?;
            Ok(body)
        })
        .await
    }
}

/// Maps raw upstream records one by one; a record that fails to decode or
/// validate is logged and dropped without failing the batch.
pub fn map_records<R, F>(source: &str, records: Vec<Value>, transform: F) -> Vec<Token>
where
    R: DeserializeOwned,
    F: Fn(R) -> Result<Token>,
{
    let total = records.len();
    let tokens: Vec<Token> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            match serde_json::from_value::<R>(raw)
                .map_err(Error::from)
                .and_then(&transform)
            {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("{}: dropping record {}: {}", source, index, e);
                    None
                }
            }
        })
        .collect();

    debug!("{}: mapped {}/{} records", source, tokens.len(), total);
    tokens
}

/// Array at `key`; a missing or null key is an empty batch, anything else is malformed.
pub fn records_at(body: &Value, key: &str) -> Result<Vec<Value>> {
    if !body.is_object() {
        return Err(Error::ApiInvalidFormat(format!(
            "expected an object response, got {}",
            body
        )));
    }
    match body.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(Error::ApiInvalidFormat(format!(
            "expected `{}` to be an array, got {}",
            key, other
        ))),
    }
}

/// Builds the enabled adapters in canonical merge order.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if config.sources.dexscreener.enabled {
        sources.push(Arc::new(DexScreenerClient::new(
            &config.sources.dexscreener,
            config.retry.clone(),
        )?));
    }
    if config.sources.geckoterminal.enabled {
        sources.push(Arc::new(GeckoTerminalClient::new(
            &config.sources.geckoterminal,
            config.retry.clone(),
        )?));
    }

    if sources.is_empty() {
        warn!("No upstream sources enabled; every aggregate will be empty");
    } else {
        info!(
            "Upstream sources: {}",
            sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Raw {
        address: String,
    }

    #[test]
    fn test_map_records_drops_bad_records() {
        let records = vec![
            json!({"address": "a"}),
            json!({"nope": true}),
            json!({"address": ""}),
            json!({"address": "b"}),
        ];
        let tokens = map_records("test", records, |raw: Raw| {
            if raw.address.is_empty() {
                return Err(Error::ApiInvalidData("empty address".into()));
            }
            Ok(Token {
                address: raw.address,
                ..Default::default()
            })
        });
        let addresses: Vec<_> = tokens.iter().map(|t| t.address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "b"]);
    }

    #[test]
    fn test_records_at() {
        assert_eq!(records_at(&json!({"pairs": [1, 2]}), "pairs").unwrap().len(), 2);
        assert!(records_at(&json!({"pairs": null}), "pairs").unwrap().is_empty());
        assert!(records_at(&json!({}), "pairs").unwrap().is_empty());
        assert!(records_at(&json!({"pairs": "x"}), "pairs").is_err());
        assert!(records_at(&json!([1, 2]), "pairs").is_err());
    }

    #[test]
    fn test_build_sources_respects_order_and_flags() {
        let mut config = Config::default();
        let names: Vec<String> = build_sources(&config)
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["dexscreener", "geckoterminal"]);

        config.sources.dexscreener.enabled = false;
        let names: Vec<String> = build_sources(&config)
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["geckoterminal"]);
    }
}
