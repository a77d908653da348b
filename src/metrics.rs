use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Service counters, owned by one registry and shared through an `Arc`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub upstream_failures: IntCounterVec,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub aggregates: IntCounter,
    pub ws_connections: IntGauge,
    pub broadcaster_ticks: IntCounter,
    pub events_emitted: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Self {
            upstream_failures: IntCounterVec::new(
                Opts::new("upstream_failures_total", "Failed source adapter calls"),
                &["source"],
            )?,
            cache_hits: IntCounter::new("cache_hits_total", "Aggregation cache hits")?,
            cache_misses: IntCounter::new("cache_misses_total", "Aggregation cache misses")?,
            aggregates: IntCounter::new(
                "aggregates_total",
                "Merge/filter/sort pipelines computed from upstream data",
            )?,
            ws_connections: IntGauge::new("ws_connections", "Open realtime connections")?,
            broadcaster_ticks: IntCounter::new("broadcaster_ticks_total", "Completed broadcaster ticks")?,
            events_emitted: IntCounterVec::new(
                Opts::new("events_emitted_total", "Realtime events sent by kind"),
                &["event"],
            )?,
            registry,
        };

        metrics.registry.register(Box::new(metrics.upstream_failures.clone()))?;
        metrics.registry.register(Box::new(metrics.cache_hits.clone()))?;
        metrics.registry.register(Box::new(metrics.cache_misses.clone()))?;
        metrics.registry.register(Box::new(metrics.aggregates.clone()))?;
        metrics.registry.register(Box::new(metrics.ws_connections.clone()))?;
        metrics.registry.register(Box::new(metrics.broadcaster_ticks.clone()))?;
        metrics.registry.register(Box::new(metrics.events_emitted.clone()))?;

        Ok(metrics)
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::InternalError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_labelled_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.upstream_failures.with_label_values(&["dexscreener"]).inc();
        metrics.cache_hits.inc();
        metrics.ws_connections.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("upstream_failures_total{source=\"dexscreener\"} 1"));
        assert!(text.contains("cache_hits_total 1"));
        assert!(text.contains("ws_connections 3"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.aggregates.inc();
        assert_eq!(a.aggregates.get(), 1);
        assert_eq!(b.aggregates.get(), 0);
    }
}
