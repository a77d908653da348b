use crate::api::types::{deepest, lenient_f64, non_negative, TxnCounts};
use crate::api::{map_records, records_at, SourceAdapter, Upstream};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::Token;
use crate::utils::{now_millis, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const SOURCE_NAME: &str = "geckoterminal";

#[derive(Debug, Deserialize, Clone, Default)]
struct Windows {
    #[serde(default, deserialize_with = "lenient_f64")]
    h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Transactions {
    #[serde(default)]
    h24: TxnCounts,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct PoolAttributes {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    base_token_price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fdv_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    reserve_in_usd: Option<f64>,
    #[serde(default)]
    volume_usd: Windows,
    #[serde(default)]
    price_change_percentage: Windows,
    #[serde(default)]
    transactions: Transactions,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct ResourceId {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Relationship {
    data: Option<ResourceId>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct PoolRelationships {
    #[serde(default)]
    base_token: Relationship,
    #[serde(default)]
    dex: Relationship,
}

#[derive(Debug, Deserialize, Clone)]
struct Pool {
    attributes: PoolAttributes,
    #[serde(default)]
    relationships: PoolRelationships,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct IncludedToken {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attributes: IncludedTokenAttributes,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct IncludedTokenAttributes {
    #[serde(default)]
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

/// Resource ids look like `<network>_<address>`.
fn address_from_id<'a>(id: &'a str, network: &str) -> &'a str {
    id.strip_prefix(network)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(id)
}

/// `"BONK / SOL 0.25%"` -> `"BONK"`
fn base_symbol_from_pool_name(name: &str) -> String {
    name.split('/').next().unwrap_or_default().trim().to_string()
}

struct PoolMapper<'a> {
    network: &'a str,
    tokens: HashMap<String, IncludedTokenAttributes>,
}

impl<'a> PoolMapper<'a> {
    fn new(network: &'a str, body: &Value) -> Self {
        let tokens = records_at(body, "included")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<IncludedToken>(raw).ok())
            .filter(|t| t.kind == "token")
            .map(|t| (t.id, t.attributes))
            .collect();
        Self { network, tokens }
    }

    fn map(&self, pool: Pool) -> Result<Token> {
        let token_id = pool
            .relationships
            .base_token
            .data
            .map(|d| d.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::ApiInvalidData("pool without base token".into()))?;

        let included = self.tokens.get(&token_id);
        let address = included
            .map(|t| t.address.clone())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| address_from_id(&token_id, self.network).to_string());
        if address.trim().is_empty() {
            return Err(Error::ApiInvalidData(format!("unusable token id {}", token_id)));
        }

        let fallback_symbol = base_symbol_from_pool_name(&pool.attributes.name);
        let (name, symbol) = match included {
            Some(t) => (t.name.clone(), t.symbol.clone()),
            None => (fallback_symbol.clone(), fallback_symbol),
        };
        let attrs = pool.attributes;

        Ok(Token {
            address,
            name,
            symbol,
            price: non_negative(attrs.base_token_price_usd),
            market_cap: non_negative(attrs.market_cap_usd.or(attrs.fdv_usd)),
            volume_24h: non_negative(attrs.volume_usd.h24),
            liquidity: non_negative(attrs.reserve_in_usd),
            transactions_24h: attrs.transactions.h24.total(),
            price_change_1h: attrs.price_change_percentage.h1.unwrap_or_default(),
            price_change_24h: attrs.price_change_percentage.h24.unwrap_or_default(),
            price_change_7d: None,
            protocol: pool.relationships.dex.data.map(|d| d.id).unwrap_or_default(),
            source: SOURCE_NAME.to_string(),
            last_updated: now_millis(),
        })
    }
}

fn parse_pools(body: &Value, network: &str) -> Result<Vec<Token>> {
    let pools = records_at(body, "data")?;
    let mapper = PoolMapper::new(network, body);
    Ok(map_records(SOURCE_NAME, pools, |pool: Pool| mapper.map(pool)))
}

/// GeckoTerminal pool listings for one network.
#[derive(Debug)]
pub struct GeckoTerminalClient {
    upstream: Upstream,
    network: String,
}

impl GeckoTerminalClient {
    pub fn new(config: &SourceConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            upstream: Upstream::new(SOURCE_NAME, config, retry)?,
            network: config.network.clone(),
        })
    }
}

#[async_trait]
impl SourceAdapter for GeckoTerminalClient {
    fn name(&self) -> &str {
        self.upstream.name()
    }

    async fn fetch_all(&self) -> Result<Vec<Token>> {
        let body = self
            .upstream
            .get_json(
                &format!("networks/{}/trending_pools", self.network),
                &[("include", "base_token")],
            )
            .await?;
        parse_pools(&body, &self.network)
    }

    async fn search(&self, query: &str) -> Result<Vec<Token>> {
        let body = self
            .upstream
            .get_json(
                "search/pools",
                &[
                    ("query", query),
                    ("network", self.network.as_str()),
                    ("include", "base_token"),
                ],
            )
            .await?;
        parse_pools(&body, &self.network)
    }

    async fn fetch_by_address(&self, address: &str) -> Result<Vec<Token>> {
        let body = self
            .upstream
            .get_json(
                &format!("networks/{}/tokens/{}/pools", self.network, address),
                &[("include", "base_token")],
            )
            .await?;
        let matches: Vec<Token> = parse_pools(&body, &self.network)?
            .into_iter()
            .filter(|t| t.same_address(address))
            .collect();
        Ok(deepest(matches, |t| t.liquidity).into_iter().collect())
    }
}
