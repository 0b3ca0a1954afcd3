use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use model::{Station, Train, TransportKind, Wing};

use crate::config::DowntimeConfig;
use crate::health::HealthDetector;
use crate::metrics::Metrics;
use crate::store::Store;
use crate::Context;

/// A plain departure record: `number` leaving `station` with the given
/// message timestamp and current departure time.
pub fn train(
    number: &str,
    station: &str,
    timestamp: DateTime<Utc>,
    departure: DateTime<Utc>,
) -> Train {
    let destination = Station::with_name("ASD", "Amsterdam Centraal");
    Train {
        trip_id: number.to_owned(),
        trip_station: Station::with_name(station, station),
        trip_date: NaiveDate::from_ymd_opt(2014, 4, 12).unwrap(),
        message_timestamp: timestamp,
        train_number: number.to_owned(),
        transport_kind: TransportKind {
            code: "IC".to_owned(),
            name: "Intercity".to_owned(),
        },
        carrier: "NS".to_owned(),
        train_name: None,
        status: "0".to_owned(),
        planned_departure: departure,
        current_departure: departure,
        exact_delay_seconds: 0,
        damped_delay_seconds: 0,
        planned_platform: Vec::new(),
        current_platform: Vec::new(),
        planned_destinations: vec![destination.clone()],
        current_destinations: vec![destination.clone()],
        planned_short_route: Vec::new(),
        current_short_route: Vec::new(),
        reservation_required: false,
        supplement_required: false,
        do_not_board: false,
        special_ticket: false,
        shunting: false,
        rear_stays_behind: false,
        wings: vec![Wing::towards(destination)],
        modifications: Vec::new(),
        travel_tips: Vec::new(),
        boarding_tips: Vec::new(),
        transfer_tips: Vec::new(),
        synthetic: false,
        departed_timestamp: None,
    }
}

/// A context with default settings and an empty store.
pub fn context() -> Context {
    Context {
        store: Arc::new(Store::new()),
        metrics: Arc::new(Metrics::new()),
        health: Arc::new(RwLock::new(HealthDetector::new(&DowntimeConfig::default()))),
    }
}
