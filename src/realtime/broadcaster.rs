use crate::aggregator::Aggregator;
use crate::config::BroadcasterConfig;
use crate::metrics::Metrics;
use crate::models::{QueryOptions, SortKey, SortOrder, Token};
use crate::realtime::events::{PriceUpdate, ServerEvent, TokenUpdate, VolumeSpike};
use crate::realtime::hub::Hub;
use crate::utils::now_millis;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Changes between two consecutive snapshots.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotDiff {
    pub price_updates: Vec<PriceUpdate>,
    pub volume_spikes: Vec<VolumeSpike>,
    /// One entry per token present in both snapshots, whatever its movement.
    pub token_updates: Vec<TokenUpdate>,
}

fn pct_change(old: f64, new: f64) -> Option<f64> {
    (old > 0.0).then(|| (new - old) / old * 100.0)
}

/// Compares `current` against `previous`. Tokens without a previous entry
/// are skipped.
pub fn diff(
    previous: &HashMap<String, Token>,
    current: &[Token],
    config: &BroadcasterConfig,
    timestamp: i64,
) -> SnapshotDiff {
    let mut out = SnapshotDiff::default();

    for token in current {
        let Some(prev) = previous.get(&token.key()) else {
            continue;
        };

        let price_pct = pct_change(prev.price, token.price).map(f64::abs);
        let volume_pct = pct_change(prev.volume_24h, token.volume_24h);

        if let Some(change) = price_pct.filter(|c| *c > config.price_change_threshold_pct) {
            out.price_updates.push(PriceUpdate {
                address: token.address.clone(),
                symbol: token.symbol.clone(),
                old_price: prev.price,
                new_price: token.price,
                change_pct: change,
                timestamp,
            });
        }
        if let Some(change) = volume_pct.filter(|c| *c > config.volume_spike_threshold_pct) {
            out.volume_spikes.push(VolumeSpike {
                address: token.address.clone(),
                symbol: token.symbol.clone(),
                old_volume: prev.volume_24h,
                new_volume: token.volume_24h,
                change_pct: change,
                timestamp,
            });
        }
        out.token_updates.push(TokenUpdate {
            token: token.clone(),
            price_change_pct: price_pct.unwrap_or_default(),
            volume_change_pct: volume_pct.unwrap_or_default(),
            timestamp,
        });
    }
    out
}

/// What one completed tick sent out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub snapshot_size: usize,
    pub price_updates: usize,
    pub volume_spikes: usize,
    pub topic_deliveries: usize,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodically refreshes the top of the listing and pushes what changed.
///
/// Ticks never overlap: a tick that fires while the previous one is still
/// running is skipped, and missed interval ticks are not replayed.
pub struct DiffBroadcaster {
    aggregator: Arc<Aggregator>,
    hub: Arc<Hub>,
    config: BroadcasterConfig,
    metrics: Arc<Metrics>,
    previous: Mutex<HashMap<String, Token>>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiffBroadcaster {
    pub fn new(
        aggregator: Arc<Aggregator>,
        hub: Arc<Hub>,
        config: BroadcasterConfig,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            aggregator,
            hub,
            config,
            metrics,
            previous: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Spawns the tick loop. Calling it again while running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Diff broadcaster already started");
            return;
        }

        let broadcaster = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        let period = self.config.interval();
        info!("Diff broadcaster started, ticking every {:?}", period);

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let worker = Arc::clone(&broadcaster);
                        tokio::spawn(async move {
                            worker.tick().await;
                        });
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Diff broadcaster loop exited");
        }));
    }

    /// Halts the timer. A tick already in flight runs to completion.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Diff broadcaster task ended abnormally: {}", e);
            }
            info!("Diff broadcaster stopped");
        }
    }

    /// Runs one comparison cycle; `None` when another tick is still running.
    pub async fn tick(&self) -> Option<TickReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Skipping broadcaster tick, previous tick still running");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        self.aggregator.invalidate().await;
        let snapshot = self
            .aggregator
            .aggregate(&QueryOptions {
                limit: Some(self.config.top_n),
                sort_by: Some(SortKey::Volume),
                sort_order: Some(SortOrder::Desc),
                ..Default::default()
            })
            .await
            .tokens;

        let mut previous = self.previous.lock().await;
        let changes = diff(&previous, &snapshot, &self.config, now_millis());

        let mut report = TickReport {
            snapshot_size: snapshot.len(),
            price_updates: changes.price_updates.len(),
            volume_spikes: changes.volume_spikes.len(),
            topic_deliveries: 0,
        };

        for update in changes.token_updates {
            let address = update.token.address.clone();
            let event = ServerEvent::TokenUpdate(update);
            let delivered = self.hub.publish(&address, &event).await;
            if delivered > 0 {
                self.count_event(&event, delivered);
                report.topic_deliveries += delivered;
            }
        }
        if !changes.price_updates.is_empty() {
            self.emit(ServerEvent::PriceUpdates(changes.price_updates)).await;
        }
        if !changes.volume_spikes.is_empty() {
            self.emit(ServerEvent::VolumeSpikes(changes.volume_spikes)).await;
        }

        *previous = snapshot.into_iter().map(|t| (t.key(), t)).collect();
        self.metrics.broadcaster_ticks.inc();
        info!(
            "Tick: {} tokens, {} price updates, {} volume spikes, {} topic deliveries",
            report.snapshot_size, report.price_updates, report.volume_spikes, report.topic_deliveries
        );
        Some(report)
    }

    async fn emit(&self, event: ServerEvent) {
        let delivered = self.hub.broadcast(&event).await;
        self.count_event(&event, delivered);
    }

    fn count_event(&self, event: &ServerEvent, delivered: usize) {
        self.metrics
            .events_emitted
            .with_label_values(&[event.name()])
            .inc_by(delivered as u64);
    }
}
