use crate::aggregator::Aggregator;
use crate::api::SourceAdapter;
use crate::config::AggregatorConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::models::Token;
use crate::utils::{Cache, MemoryStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Token with the fields most tests care about; the rest default.
pub fn token(address: &str, volume: f64, liquidity: f64) -> Token {
    Token {
        address: address.to_string(),
        name: format!("{} token", address),
        symbol: address.to_uppercase(),
        price: 1.0,
        volume_24h: volume,
        liquidity,
        source: "fake".to_string(),
        ..Default::default()
    }
}

/// In-memory adapter with a swappable response and an on/off failure switch.
pub struct FakeSource {
    name: String,
    tokens: Mutex<Vec<Token>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(name: &str, tokens: Vec<Token>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tokens: Mutex::new(tokens),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let source = Self::new(name, Vec::new());
        source.set_failing(true);
        source
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
                provider: self.name.clone(),
                status: 503,
            });
        }
        Ok(self.tokens.lock().unwrap().clone())
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_all(&self) -> Result<Vec<Token>> {
        self.respond()
    }

    async fn search(&self, query: &str) -> Result<Vec<Token>> {
        let query = query.to_lowercase();
        Ok(self
            .respond()?
            .into_iter()
            .filter(|t| {
                t.symbol.to_lowercase().contains(&query) || t.name.to_lowercase().contains(&query)
            })
            .collect())
    }

    async fn fetch_by_address(&self, address: &str) -> Result<Vec<Token>> {
        Ok(self
            .respond()?
            .into_iter()
            .filter(|t| t.same_address(address))
            .take(1)
            .collect())
    }
}

pub fn memory_cache() -> Cache {
    Cache::new(Arc::new(MemoryStore::new()), "tokens", Duration::from_secs(30))
}

pub fn aggregator_with(sources: Vec<Arc<FakeSource>>, cache: Cache) -> Arc<Aggregator> {
    let sources: Vec<Arc<dyn SourceAdapter>> = sources
        .into_iter()
        .map(|s| s as Arc<dyn SourceAdapter>)
        .collect();
    Arc::new(Aggregator::new(
        sources,
        cache,
        AggregatorConfig::default(),
        Arc::new(Metrics::new().unwrap()),
    ))
}
