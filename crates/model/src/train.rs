use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::modification::{Modification, ModificationKind};
use crate::platform::{join_platforms, Platform};
use crate::station::Station;
use crate::tips::{BoardingTip, TransferTip, TravelTip};
use crate::wing::Wing;

/// Feed status code for a departed train. Other status values are opaque
/// and flow through to clients unchanged.
pub const STATUS_DEPARTED: &str = "5";

/// Transport product of a train: short code plus long name,
/// e.g. "IC" / "Intercity".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportKind {
    pub code: String,
    pub name: String,
}

/// One imminent departure: a scheduled trip as seen from the station it is
/// about to leave. This is the value stored in both indices and served to
/// clients, so its field names are part of the wire contract.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub trip_id: String,
    pub trip_station: Station,
    pub trip_date: NaiveDate,

    /// Producer timestamp of the message this record was built from; the
    /// store only ever replaces a record with a newer one.
    pub message_timestamp: DateTime<Utc>,

    pub train_number: String,
    pub transport_kind: TransportKind,
    pub carrier: String,
    pub train_name: Option<String>,
    pub status: String,

    pub planned_departure: DateTime<Utc>,
    pub current_departure: DateTime<Utc>,
    pub exact_delay_seconds: i64,
    pub damped_delay_seconds: i64,

    pub planned_platform: Vec<Platform>,
    pub current_platform: Vec<Platform>,
    pub planned_destinations: Vec<Station>,
    pub current_destinations: Vec<Station>,
    pub planned_short_route: Vec<Station>,
    pub current_short_route: Vec<Station>,

    pub reservation_required: bool,
    pub supplement_required: bool,
    pub do_not_board: bool,
    pub special_ticket: bool,
    pub shunting: bool,
    pub rear_stays_behind: bool,

    pub wings: Vec<Wing>,
    pub modifications: Vec<Modification>,

    pub travel_tips: Vec<TravelTip>,
    pub boarding_tips: Vec<BoardingTip>,
    pub transfer_tips: Vec<TransferTip>,

    /// True for trains installed through the injector; they are garbage
    /// collected more aggressively than feed trains.
    pub synthetic: bool,

    /// Set once the trip is marked departed, either by a status-5 message
    /// or by the lifecycle sweep. Departed trains stay queryable until the
    /// retention window runs out.
    pub departed_timestamp: Option<DateTime<Utc>>,
}

impl Train {
    pub fn is_departed(&self) -> bool {
        self.status == STATUS_DEPARTED
    }

    /// A train is cancelled when any train-level modification says so.
    pub fn is_cancelled(&self) -> bool {
        self.modifications
            .iter()
            .any(|modification| modification.kind == ModificationKind::Cancelled)
    }

    /// Whether the current platform sequence deviates from the plan.
    pub fn platform_changed(&self) -> bool {
        self.planned_platform != self.current_platform
    }
}

impl fmt::Display for Train {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} at {} platform {} +{}s",
            self.transport_kind.code,
            self.train_number,
            self.trip_station.code,
            join_platforms(&self.current_platform),
            self.exact_delay_seconds,
        )
    }
}
