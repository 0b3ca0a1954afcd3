use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use model::Train;

/// Inner map of an index: train number → train inside a station bucket,
/// station code → train inside a train-number bucket.
pub type Bucket = BTreeMap<String, Train>;

/// A full index, as served by the store/* commands and persisted across
/// restarts.
pub type Index = BTreeMap<String, Bucket>;

/// Outcome of applying one incoming train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Installed,
    /// Same message timestamp as the stored record; dropped.
    Duplicate,
    /// Older than the stored record; dropped. Carries the age gap.
    Stale { gap: Duration },
}

/// The dual-index departure store.
///
/// Both indices hold their own copy of every train. Mutations update both
/// sides while both locks are held (station lock first, everywhere) so a
/// reader snapshot never observes half a pair.
#[derive(Debug, Default)]
pub struct Store {
    by_station: RwLock<Index>,
    by_train: RwLock<Index>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an incoming train under the monotonic update rule: within one
    /// (train number, station) slot the stored message timestamp never
    /// decreases. A departed message (status 5) bypasses the comparison,
    /// gets its departed timestamp stamped and always installs.
    pub async fn apply(&self, mut train: Train, now: DateTime<Utc>) -> UpdateOutcome {
        if train.is_departed() && train.departed_timestamp.is_none() {
            train.departed_timestamp = Some(now);
        }

        let station = train.trip_station.code.clone();
        let number = train.train_number.clone();

        let mut by_station = self.by_station.write().await;
        let mut by_train = self.by_train.write().await;

        if !train.is_departed() {
            if let Some(existing) = by_station
                .get(&station)
                .and_then(|bucket| bucket.get(&number))
            {
                if train.message_timestamp == existing.message_timestamp {
                    return UpdateOutcome::Duplicate;
                }
                if train.message_timestamp < existing.message_timestamp {
                    return UpdateOutcome::Stale {
                        gap: existing.message_timestamp - train.message_timestamp,
                    };
                }
            }
        }

        install(&mut by_station, &station, &number, train.clone());
        install(&mut by_train, &number, &station, train);
        UpdateOutcome::Installed
    }

    /// Remove one (train number, station) pair from both indices.
    /// Idempotent: a half that is already gone is a debug-level event.
    /// An emptied train-number bucket is pruned; station buckets stay.
    pub async fn evict(&self, number: &str, station: &str) {
        let mut by_station = self.by_station.write().await;
        let mut by_train = self.by_train.write().await;

        let station_half = by_station
            .get_mut(station)
            .map_or(false, |bucket| bucket.remove(number).is_some());
        if !station_half {
            log::debug!("train {} already gone from station bucket {}", number, station);
        }

        let mut prune = false;
        match by_train.get_mut(number) {
            Some(bucket) => {
                if bucket.remove(station).is_none() {
                    log::debug!("station {} already gone from train bucket {}", station, number);
                }
                prune = bucket.is_empty();
            }
            None => {
                log::debug!("train bucket {} already gone", number);
            }
        }
        if prune {
            by_train.remove(number);
        }
    }

    pub async fn station_snapshot(&self, code: &str) -> Option<Bucket> {
        self.by_station.read().await.get(code).cloned()
    }

    pub async fn train_snapshot(&self, number: &str) -> Option<Bucket> {
        self.by_train.read().await.get(number).cloned()
    }

    pub async fn dump_by_station(&self) -> Index {
        self.by_station.read().await.clone()
    }

    pub async fn dump_by_train(&self) -> Index {
        self.by_train.read().await.clone()
    }

    /// Number of distinct station buckets.
    pub async fn station_count(&self) -> usize {
        self.by_station.read().await.len()
    }

    /// Number of distinct train-number buckets.
    pub async fn train_count(&self) -> usize {
        self.by_train.read().await.len()
    }

    /// Run a closure over the station index under its write lock. The train
    /// index lock is not held; evictions go through [`Store::evict`].
    pub async fn with_station_index<R>(&self, f: impl FnOnce(&mut Index) -> R) -> R {
        f(&mut *self.by_station.write().await)
    }

    /// Same for the train index.
    pub async fn with_train_index<R>(&self, f: impl FnOnce(&mut Index) -> R) -> R {
        f(&mut *self.by_train.write().await)
    }

    pub async fn restore_station_index(&self, index: Index) {
        *self.by_station.write().await = index;
    }

    pub async fn restore_train_index(&self, index: Index) {
        *self.by_train.write().await = index;
    }
}

/// Install into one index, re-checking monotonicity against that side's own
/// record so a bucket can never go backwards even if the indices were
/// restored from diverged snapshots.
fn install(index: &mut Index, outer: &str, inner: &str, train: Train) {
    let bucket = index.entry(outer.to_owned()).or_default();
    match bucket.get(inner) {
        Some(existing)
            if !train.is_departed() && train.message_timestamp < existing.message_timestamp =>
        {
            log::debug!(
                "keeping newer record for {}/{} ({} vs {})",
                outer,
                inner,
                existing.message_timestamp,
                train.message_timestamp
            );
        }
        _ => {
            bucket.insert(inner.to_owned(), train);
        }
    }
}
