use crate::api::SourceAdapter;
use crate::config::AggregatorConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::models::{PageResult, QueryOptions, Token};
use crate::utils::{now_millis, Cache};
use futures::future::join_all;
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;

pub mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::CachedCollection;

/// Merge, filter, sort and paginate engine over every configured source,
/// with a cache-aside layer in front of the upstream calls.
pub struct Aggregator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    cache: Cache,
    config: AggregatorConfig,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    /// `sources` must be in canonical order; it decides identity-field ties.
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        cache: Cache,
        config: AggregatorConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sources,
            cache,
            config,
            metrics,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    fn limit(&self, options: &QueryOptions) -> usize {
        options
            .limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit)
    }

    /// One page of the merged listing. Upstream failures only shrink the result.
    pub async fn aggregate(&self, options: &QueryOptions) -> PageResult {
        let key = format!("list:{}", options.fingerprint());
        let collection = self
            .collection(&key, options, |source| async move { source.fetch_all().await })
            .await;
        pipeline::paginate(&collection, self.limit(options), options.cursor.as_deref())
    }

    pub async fn search(&self, query: &str, options: &QueryOptions) -> Result<PageResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::ValidationError("search query is required".into()));
        }

        let key = format!("search:{}:{}", query, options.fingerprint());
        let owned = query.to_string();
        let collection = self
            .collection(&key, options, move |source| {
                let query = owned.clone();
                async move { source.search(&query).await }
            })
            .await;
        Ok(pipeline::paginate(
            &collection,
            self.limit(options),
            options.cursor.as_deref(),
        ))
    }

    /// First match in source order, unmerged. Absence is `Ok(None)`.
    /// Only this lookup writes `address:*` entries.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<Token>> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::ValidationError("token address is required".into()));
        }

        let key = address_key(address);
        if let Some(token) = self.cache.get::<Token>(&key).await {
            self.metrics.cache_hits.inc();
            return Ok(Some(token));
        }
        self.metrics.cache_misses.inc();

        let owned = address.to_string();
        let found = self
            .scatter(move |source| {
                let address = owned.clone();
                async move { source.fetch_by_address(&address).await }
            })
            .await
            .into_iter()
            .flatten()
            .find(|t| t.same_address(address));

        if let Some(token) = &found {
            self.cache.set(&key, token).await;
        }
        Ok(found)
    }

    /// Drops every cached listing, search and address entry.
    pub async fn invalidate(&self) -> usize {
        let removed = self.cache.clear().await;
        debug!("Invalidated {} cached entries", removed);
        removed
    }

    async fn collection<F, Fut>(
        &self,
        key: &str,
        options: &QueryOptions,
        fetch: F,
    ) -> CachedCollection
    where
        F: Fn(Arc<dyn SourceAdapter>) -> Fut,
        Fut: Future<Output = Result<Vec<Token>>> + Send + 'static,
    {
        if let Some(collection) = self.cache.get::<CachedCollection>(key).await {
            self.metrics.cache_hits.inc();
            return collection;
        }
        self.metrics.cache_misses.inc();

        let merged = pipeline::merge_tokens(self.scatter(fetch).await);
        let mut tokens = pipeline::filter(merged, options);
        pipeline::sort_tokens(&mut tokens, options.sort_key(), options.order());

        let collection = CachedCollection {
            tokens,
            generated_at: now_millis(),
        };
        self.metrics.aggregates.inc();
        info!(
            "Aggregated {} tokens for {} from {} sources",
            collection.tokens.len(),
            key,
            self.sources.len()
        );

        self.cache.set(key, &collection).await;
        collection
    }

    /// Runs `fetch` against every source as its own task. Results come back
    /// in source order; a failed source contributes an empty batch.
    async fn scatter<F, Fut>(&self, fetch: F) -> Vec<Vec<Token>>
    where
        F: Fn(Arc<dyn SourceAdapter>) -> Fut,
        Fut: Future<Output = Result<Vec<Token>>> + Send + 'static,
    {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| tokio::spawn(fetch(source.clone())))
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(&self.sources)
            .map(|(joined, source)| match joined {
                Ok(Ok(tokens)) => {
                    debug!("{} returned {} tokens", source.name(), tokens.len());
                    tokens
                }
                Ok(Err(e)) => {
                    error!("Source {} failed: {}", source.name(), e);
                    self.metrics
                        .upstream_failures
                        .with_label_values(&[source.name()])
                        .inc();
                    Vec::new()
                }
                Err(e) => {
                    error!("Source {} task aborted: {}", source.name(), e);
                    self.metrics
                        .upstream_failures
                        .with_label_values(&[source.name()])
                        .inc();
                    Vec::new()
                }
            })
            .collect()
    }
}

fn address_key(address: &str) -> String {
    format!("address:{}", address.to_lowercase())
}
