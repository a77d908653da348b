use crate::error::{Error, Result};
use crate::utils::RetryPolicy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub aggregator: AggregatorConfig,
    pub retry: RetryPolicy,
    pub broadcaster: BroadcasterConfig,
    pub sources: SourcesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Inbound requests allowed per client IP per window.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            namespace: "tokens".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AggregatorConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcasterConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub top_n: usize,
    /// Absolute price move, in percent, that puts a token in the price-update batch.
    pub price_change_threshold_pct: f64,
    /// Volume growth, in percent, that puts a token in the volume-spike batch.
    pub volume_spike_threshold_pct: f64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            top_n: 100,
            price_change_threshold_pct: 1.0,
            volume_spike_threshold_pct: 50.0,
        }
    }
}

impl BroadcasterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub dexscreener: SourceConfig,
    pub geckoterminal: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dexscreener: SourceConfig {
                base_url: "https://api.dexscreener.com".to_string(),
                max_requests: 300,
                window_ms: 60_000,
                default_query: "solana".to_string(),
                ..SourceConfig::default()
            },
            geckoterminal: SourceConfig {
                base_url: "https://api.geckoterminal.com/api/v2".to_string(),
                max_requests: 30,
                window_ms: 60_000,
                ..SourceConfig::default()
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Outbound request budget per window.
    pub max_requests: u32,
    pub window_ms: u64,
    /// Search term used for the unfiltered listing where the upstream has no list endpoint.
    pub default_query: String,
    pub network: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            timeout_secs: 10,
            max_requests: 60,
            window_ms: 60_000,
            default_query: String::new(),
            network: "solana".to_string(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise starts from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let config = Self::load(path)?;
            info!("Configuration loaded from {:?}", path);
            Ok(config)
        } else {
            warn!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Applies `HOST`, `PORT`, `CACHE_TTL_SECS`, `BROADCAST_INTERVAL_SECS` and `LOG_FILE`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(ttl) = lookup("CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("CACHE_TTL_SECS", &ttl)?;
        }
        if let Some(interval) = lookup("BROADCAST_INTERVAL_SECS") {
            self.broadcaster.interval_secs = parse_env("BROADCAST_INTERVAL_SECS", &interval)?;
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.logging.file = Some(file);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregator.max_limit == 0 {
            return Err(Error::ConfigError("aggregator.max_limit must be positive".into()));
        }
        if self.aggregator.default_limit == 0 || self.aggregator.default_limit > self.aggregator.max_limit {
            return Err(Error::ConfigError(
                "aggregator.default_limit must be within 1..=max_limit".into(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::ConfigError("retry.backoff_multiplier must be >= 1".into()));
        }
        for (name, source) in [
            ("dexscreener", &self.sources.dexscreener),
            ("geckoterminal", &self.sources.geckoterminal),
        ] {
            if source.enabled && source.max_requests == 0 {
                return Err(Error::ConfigError(format!(
                    "sources.{}.max_requests must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigError(format!("{} has an invalid value: {}", key, value)))
}
