use crate::aggregator::Aggregator;
use crate::api::SourceAdapter;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::realtime::{DiffBroadcaster, Hub, RealtimeService};
use crate::utils::{Cache, CacheStore};
use crate::web::{AppState, InboundRateLimiter};
use std::sync::Arc;

/// Wired service components, built once at startup.
pub struct Services {
    pub aggregator: Arc<Aggregator>,
    pub hub: Arc<Hub>,
    pub broadcaster: Arc<DiffBroadcaster>,
    pub metrics: Arc<Metrics>,
    pub state: AppState,
}

impl Services {
    /// `sources` are used in the order given.
    pub fn build(
        config: &Config,
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let cache = Cache::new(store.clone(), config.cache.namespace.clone(), config.cache.ttl());
        let aggregator = Arc::new(Aggregator::new(
            sources,
            cache,
            config.aggregator.clone(),
            metrics.clone(),
        ));

        let hub = Arc::new(Hub::new());
        let realtime = RealtimeService::new(aggregator.clone(), hub.clone(), metrics.clone());
        let broadcaster = DiffBroadcaster::new(
            aggregator.clone(),
            hub.clone(),
            config.broadcaster.clone(),
            metrics.clone(),
        );
        let limiter = Arc::new(InboundRateLimiter::new(
            store,
            config.server.rate_limit_max_requests,
            config.server.rate_limit_window(),
        ));

        let state = AppState {
            aggregator: aggregator.clone(),
            realtime,
            metrics: metrics.clone(),
            limiter,
        };

        Ok(Self {
            aggregator,
            hub,
            broadcaster,
            metrics,
            state,
        })
    }
}
