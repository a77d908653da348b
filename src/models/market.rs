use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical per-asset snapshot, merged across sources by address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub transactions_24h: u64,
    pub price_change_1h: f64,
    pub price_change_24h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_7d: Option<f64>,
    /// Venue the listing trades on (e.g. `raydium`).
    pub protocol: String,
    /// Adapter the record came from.
    pub source: String,
    /// Milliseconds since the unix epoch.
    pub last_updated: i64,
}

impl Token {
    /// Identity key; addresses compare case-insensitively.
    pub fn key(&self) -> String {
        self.address.to_lowercase()
    }

    pub fn same_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SortKey {
    #[default]
    Volume,
    MarketCap,
    Liquidity,
    PriceChange,
}

impl SortKey {
    /// Unknown keys fall back to volume.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "market_cap" => SortKey::MarketCap,
            "liquidity" => SortKey::Liquidity,
            "price_change" => SortKey::PriceChange,
            _ => SortKey::Volume,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Volume => "volume",
            SortKey::MarketCap => "market_cap",
            SortKey::Liquidity => "liquidity",
            SortKey::PriceChange => "price_change",
        }
    }

    pub fn project(&self, token: &Token) -> f64 {
        match self {
            SortKey::Volume => token.volume_24h,
            SortKey::MarketCap => token.market_cap,
            SortKey::Liquidity => token.liquidity,
            SortKey::PriceChange => token.price_change_1h,
        }
    }
}

impl From<String> for SortKey {
    fn from(value: String) -> Self {
        SortKey::parse(&value)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Anything other than `asc` sorts descending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl From<String> for SortOrder {
    fn from(value: String) -> Self {
        SortOrder::parse(&value)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query options. Unset options stay `None` rather than defaulting to zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub sort_by: Option<SortKey>,
    pub sort_order: Option<SortOrder>,
    pub min_volume: Option<f64>,
    pub min_liquidity: Option<f64>,
}

impl QueryOptions {
    pub fn sort_key(&self) -> SortKey {
        self.sort_by.unwrap_or_default()
    }

    pub fn order(&self) -> SortOrder {
        self.sort_order.unwrap_or_default()
    }

    /// Canonical form of the options that shape the unpaginated collection.
    /// Limit and cursor are excluded so every page shares one cached collection.
    pub fn fingerprint(&self) -> String {
        fn threshold(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        }

        format!(
            "sort={}:order={}:min_volume={}:min_liquidity={}",
            self.sort_key(),
            self.order(),
            threshold(self.min_volume),
            threshold(self.min_liquidity),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageResult {
    pub tokens: Vec<Token>,
    pub next_cursor: Option<String>,
    pub total_count: usize,
    /// Milliseconds since the unix epoch when the underlying collection was built.
    pub generated_at: i64,
}
