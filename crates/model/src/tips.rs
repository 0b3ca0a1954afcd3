use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::station::Station;

/// Passenger guidance carried along with a departure. The daemon stores
/// these verbatim for its clients and never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTip {
    pub code: String,
    pub stations: Vec<Station>,
}

/// Advice to take an alternative train that reaches a station sooner.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardingTip {
    pub transport_kind: String,
    pub alight_station: Station,
    pub destination: Station,
    pub departure: DateTime<Utc>,
    pub platform: Option<Platform>,
}

/// Advice to change trains at an intermediate station for a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTip {
    pub destination: Station,
    pub transfer_station: Station,
}
