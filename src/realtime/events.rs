use crate::models::{PageResult, QueryOptions, Token};
use serde::{Deserialize, Serialize};

/// Price move for one token between two ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub address: String,
    pub symbol: String,
    pub old_price: f64,
    pub new_price: f64,
    pub change_pct: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpike {
    pub address: String,
    pub symbol: String,
    pub old_volume: f64,
    pub new_volume: f64,
    pub change_pct: f64,
    pub timestamp: i64,
}

/// Per-tick snapshot of a token pushed to its topic subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUpdate {
    pub token: Token,
    pub price_change_pct: f64,
    pub volume_change_pct: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Events pushed to clients as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    InitialData(PageResult),
    FilteredData(PageResult),
    PriceUpdates(Vec<PriceUpdate>),
    VolumeSpikes(Vec<VolumeSpike>),
    TokenUpdate(TokenUpdate),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitialData(_) => "initial_data",
            ServerEvent::FilteredData(_) => "filtered_data",
            ServerEvent::PriceUpdates(_) => "price_updates",
            ServerEvent::VolumeSpikes(_) => "volume_spikes",
            ServerEvent::TokenUpdate(_) => "token_update",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
    pub address: String,
}

/// Events received from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SetFilters(QueryOptions),
    SubscribeToken(AddressPayload),
    UnsubscribeToken(AddressPayload),
    Refresh,
}
