#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use token_aggregator::api::SourceAdapter;
use token_aggregator::app::Services;
use token_aggregator::config::Config;
use token_aggregator::error::{Error, Result};
use token_aggregator::models::Token;
use token_aggregator::utils::MemoryStore;

pub fn token(address: &str, symbol: &str, price: f64, volume: f64, liquidity: f64) -> Token {
    Token {
        address: address.to_string(),
        name: symbol.to_string(),
        symbol: symbol.to_string(),
        price,
        volume_24h: volume,
        liquidity,
        source: "stub".to_string(),
        ..Default::default()
    }
}

pub struct StubSource {
    name: &'static str,
    tokens: Mutex<Vec<Token>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(name: &'static str, tokens: Vec<Token>) -> Arc<Self> {
        Arc::new(Self {
            name,
            tokens: Mutex::new(tokens),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_tokens(&self, tokens: Vec<Token>) {
        *self.tokens.lock().unwrap() = tokens;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Result<Vec<Token>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::UpstreamStatus {
                provider: self.name.to_string(),
                status: 500,
            });
        }
        Ok(self.tokens.lock().unwrap().clone())
    }
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_all(&self) -> Result<Vec<Token>> {
        self.respond()
    }

    async fn search(&self, query: &str) -> Result<Vec<Token>> {
        let query = query.to_lowercase();
        Ok(self
            .respond()?
            .into_iter()
            .filter(|t| t.symbol.to_lowercase().contains(&query))
            .collect())
    }

    async fn fetch_by_address(&self, address: &str) -> Result<Vec<Token>> {
        Ok(self
            .respond()?
            .into_iter()
            .filter(|t| t.same_address(address))
            .collect())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.rate_limit_max_requests = 1_000;
    config
}

pub fn services(config: &Config, sources: Vec<Arc<StubSource>>) -> Services {
    let sources: Vec<Arc<dyn SourceAdapter>> = sources
        .into_iter()
        .map(|s| s as Arc<dyn SourceAdapter>)
        .collect();
    Services::build(config, sources, Arc::new(MemoryStore::new())).unwrap()
}
