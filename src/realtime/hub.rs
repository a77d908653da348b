use crate::models::QueryOptions;
use crate::realtime::events::ServerEvent;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

pub type ConnectionId = Uuid;

struct Connection {
    sender: UnboundedSender<ServerEvent>,
    filters: Option<QueryOptions>,
}

/// Registry of live realtime connections and their per-token topics.
///
/// Each connection owns an unbounded outbound queue; the socket task drains
/// it. A closed queue means the socket is gone and sends to it are dropped.
#[derive(Default)]
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    topics: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

fn topic_key(address: &str) -> String {
    address.trim().to_lowercase()
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.connections.write().await.insert(
            id,
            Connection {
                sender,
                filters: None,
            },
        );
        info!("Realtime connection {} opened", id);
        (id, receiver)
    }

    /// Removes the connection and its topic memberships, pruning empty topics.
    pub async fn disconnect(&self, id: ConnectionId) {
        let removed = self.connections.write().await.remove(&id).is_some();

        let mut topics = self.topics.write().await;
        topics.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });

        if removed {
            info!("Realtime connection {} closed", id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// Sends to every connection and returns how many accepted the event.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.sender.send(event.clone()).is_ok())
            .count()
    }

    /// Sends to the connections subscribed to `address`.
    pub async fn publish(&self, address: &str, event: &ServerEvent) -> usize {
        let members: Vec<ConnectionId> = match self.topics.read().await.get(&topic_key(address)) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let connections = self.connections.read().await;
        members
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|c| c.sender.send(event.clone()).is_ok())
            .count()
    }

    pub async fn send(&self, id: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.read().await.get(&id) {
            Some(connection) => connection.sender.send(event).is_ok(),
            None => {
                debug!("Dropping {} for unknown connection {}", event.name(), id);
                false
            }
        }
    }

    /// Membership is only added while the connection is still registered.
    pub async fn subscribe(&self, id: ConnectionId, address: &str) -> bool {
        let mut topics = self.topics.write().await;
        if !self.connections.read().await.contains_key(&id) {
            warn!("Subscribe from unknown connection {}", id);
            return false;
        }
        topics.entry(topic_key(address)).or_default().insert(id)
    }

    pub async fn unsubscribe(&self, id: ConnectionId, address: &str) -> bool {
        let mut topics = self.topics.write().await;
        let key = topic_key(address);
        let Some(members) = topics.get_mut(&key) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            topics.remove(&key);
        }
        removed
    }

    pub async fn set_filters(&self, id: ConnectionId, filters: QueryOptions) -> bool {
        match self.connections.write().await.get_mut(&id) {
            Some(connection) => {
                connection.filters = Some(filters);
                true
            }
            None => false,
        }
    }

    pub async fn filters(&self, id: ConnectionId) -> Option<QueryOptions> {
        self.connections
            .read()
            .await
            .get(&id)
            .and_then(|c| c.filters.clone())
    }
}
