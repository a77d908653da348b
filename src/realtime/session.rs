use crate::aggregator::Aggregator;
use crate::metrics::Metrics;
use crate::models::QueryOptions;
use crate::realtime::events::{ClientEvent, ServerEvent};
use crate::realtime::hub::{ConnectionId, Hub};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Connection lifecycle and inbound event handling for realtime clients.
#[derive(Clone)]
pub struct RealtimeService {
    aggregator: Arc<Aggregator>,
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
}

impl RealtimeService {
    pub fn new(aggregator: Arc<Aggregator>, hub: Arc<Hub>, metrics: Arc<Metrics>) -> Self {
        Self {
            aggregator,
            hub,
            metrics,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Registers the connection and queues the default listing for it.
    pub async fn on_connect(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (id, receiver) = self.hub.connect().await;
        self.metrics.ws_connections.inc();

        let page = self.aggregator.aggregate(&QueryOptions::default()).await;
        self.send(id, ServerEvent::InitialData(page)).await;
        (id, receiver)
    }

    pub async fn on_disconnect(&self, id: ConnectionId) {
        self.hub.disconnect(id).await;
        self.metrics.ws_connections.dec();
    }

    /// Parses one text frame. Malformed input is answered with an `error` event.
    pub async fn handle_message(&self, id: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(id, event).await,
            Err(e) => {
                debug!("Unparseable message from {}: {}", id, e);
                self.send(id, ServerEvent::error(format!("invalid message: {}", e)))
                    .await;
            }
        }
    }

    pub async fn handle_event(&self, id: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::SetFilters(options) => {
                self.hub.set_filters(id, options.clone()).await;
                let page = self.aggregator.aggregate(&options).await;
                self.send(id, ServerEvent::FilteredData(page)).await;
            }
            ClientEvent::SubscribeToken(payload) => {
                if payload.address.trim().is_empty() {
                    self.send(id, ServerEvent::error("address is required")).await;
                    return;
                }
                self.hub.subscribe(id, &payload.address).await;
                debug!("{} subscribed to {}", id, payload.address);
            }
            ClientEvent::UnsubscribeToken(payload) => {
                self.hub.unsubscribe(id, &payload.address).await;
                debug!("{} unsubscribed from {}", id, payload.address);
            }
            ClientEvent::Refresh => match self.hub.filters(id).await {
                Some(options) => {
                    let page = self.aggregator.aggregate(&options).await;
                    self.send(id, ServerEvent::FilteredData(page)).await;
                }
                None => {
                    let page = self.aggregator.aggregate(&QueryOptions::default()).await;
                    self.send(id, ServerEvent::InitialData(page)).await;
                }
            },
        }
    }

    async fn send(&self, id: ConnectionId, event: ServerEvent) {
        let name = event.name();
        if self.hub.send(id, event).await {
            self.metrics.events_emitted.with_label_values(&[name]).inc();
        } else {
            warn!("Could not deliver {} to {}", name, id);
        }
    }
}
