use crate::api::types::{deepest, lenient_f64, non_negative, TxnCounts};
use crate::api::{map_records, records_at, SourceAdapter, Upstream};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::Token;
use crate::utils::{now_millis, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub const SOURCE_NAME: &str = "dexscreener";

#[derive(Debug, Deserialize, Clone, Default)]
struct DexToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Windows {
    #[serde(default, deserialize_with = "lenient_f64")]
    h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Liquidity {
    #[serde(default, deserialize_with = "lenient_f64")]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Txns {
    #[serde(default)]
    h24: TxnCounts,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    dex_id: String,
    base_token: Option<DexToken>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fdv: Option<f64>,
    #[serde(default)]
    volume: Windows,
    #[serde(default)]
    price_change: Windows,
    #[serde(default)]
    liquidity: Liquidity,
    #[serde(default)]
    txns: Txns,
}

impl DexPair {
    fn into_token(self) -> Result<Token> {
        let base = self
            .base_token
            .ok_or_else(|| Error::ApiInvalidData("pair without base token".into()))?;
        if base.address.trim().is_empty() {
            return Err(Error::ApiInvalidData("base token without address".into()));
        }
        if self.price_usd.map_or(false, |p| p < 0.0) {
            return Err(Error::ApiInvalidData(format!(
                "negative price for {}",
                base.address
            )));
        }

        Ok(Token {
            address: base.address,
            name: base.name,
            symbol: base.symbol,
            price: non_negative(self.price_usd),
            market_cap: non_negative(self.market_cap.or(self.fdv)),
            volume_24h: non_negative(self.volume.h24),
            liquidity: non_negative(self.liquidity.usd),
            transactions_24h: self.txns.h24.total(),
            price_change_1h: self.price_change.h1.unwrap_or_default(),
            price_change_24h: self.price_change.h24.unwrap_or_default(),
            price_change_7d: None,
            protocol: self.dex_id,
            source: SOURCE_NAME.to_string(),
            last_updated: now_millis(),
        })
    }
}

fn parse_pairs(body: &Value) -> Result<Vec<Token>> {
    let pairs = records_at(body, "pairs")?;
    Ok(map_records(SOURCE_NAME, pairs, DexPair::into_token))
}

/// DexScreener pair search and token lookup.
#[derive(Debug)]
pub struct DexScreenerClient {
    upstream: Upstream,
    default_query: String,
}

impl DexScreenerClient {
    pub fn new(config: &SourceConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            upstream: Upstream::new(SOURCE_NAME, config, retry)?,
            default_query: config.default_query.clone(),
        })
    }
}

#[async_trait]
impl SourceAdapter for DexScreenerClient {
    fn name(&self) -> &str {
        self.upstream.name()
    }

    async fn fetch_all(&self) -> Result<Vec<Token>> {
        self.search(&self.default_query).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Token>> {
        let body = self
            .upstream
            .get_json("latest/dex/search", &[("q", query)])
            .await?;
        parse_pairs(&body)
    }

    async fn fetch_by_address(&self, address: &str) -> Result<Vec<Token>> {
        let body = self
            .upstream
            .get_json(&format!("latest/dex/tokens/{}", address), &[])
            .await?;
        let matches: Vec<Token> = parse_pairs(&body)?
            .into_iter()
            .filter(|t| t.same_address(address))
            .collect();
        Ok(deepest(matches, |t| t.liquidity).into_iter().collect())
    }
}
