use std::convert::Infallible;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use model::{Train, STATUS_DEPARTED};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::store::{Index, Store};
use crate::supervisor::{Continuation, Task};
use crate::Context;

/// Cadence of the departure-marking / eviction sweep and of the health
/// detector samples.
pub const TICK_SECONDS: u64 = 60;

/// Which side of the dual index a sweep runs over; decides key order and
/// which gc counter gets incremented.
#[derive(Clone, Copy)]
enum Side {
    Station,
    Train,
}

/// Departure marking and eviction policy.
///
/// Trains that never report status 5 are marked departed once their current
/// departure is long enough in the past; departed trains are evicted after
/// the retention window so "just left" queries keep working.
pub struct LifecycleEngine {
    gc_threshold: Duration,
    gc_threshold_static: Duration,
    gc_threshold_departed: Duration,
    keep_departures: bool,
}

impl LifecycleEngine {
    pub fn new(config: &Config) -> Self {
        let gc = &config.garbage_collection;
        Self {
            gc_threshold: Duration::minutes(gc.gc_threshold),
            gc_threshold_static: Duration::minutes(gc.gc_threshold_static),
            gc_threshold_departed: Duration::minutes(gc.gc_threshold_departed),
            keep_departures: config.debug.keep_departures,
        }
    }

    /// One tick: sweep the station index, evict what ran out of the
    /// retention window, then do the same over the train index.
    pub async fn tick(&self, store: &Store, metrics: &Metrics, now: DateTime<Utc>) {
        let evictions = store
            .with_station_index(|index| self.sweep(index, now, Side::Station, metrics))
            .await;
        for (number, station) in evictions {
            log::info!("evicting departed train {} at {}", number, station);
            store.evict(&number, &station).await;
        }

        let evictions = store
            .with_train_index(|index| {
                let evictions = self.sweep(index, now, Side::Train, metrics);
                // buckets can come in empty from a restored snapshot
                index.retain(|_, bucket| !bucket.is_empty());
                evictions
            })
            .await;
        for (number, station) in evictions {
            log::info!("evicting departed train {} at {}", number, station);
            store.evict(&number, &station).await;
        }
    }

    /// Mark overdue trains departed and collect (train number, station)
    /// pairs whose retention window has passed. Runs under the index lock;
    /// the actual eviction happens afterwards through [`Store::evict`].
    fn sweep(
        &self,
        index: &mut Index,
        now: DateTime<Utc>,
        side: Side,
        metrics: &Metrics,
    ) -> Vec<(String, String)> {
        let mut evictions = Vec::new();
        for (outer, bucket) in index.iter_mut() {
            for (inner, train) in bucket.iter_mut() {
                if train.is_departed() {
                    match train.departed_timestamp {
                        None => {
                            // departed through the feed but never stamped
                            train.departed_timestamp = Some(now);
                        }
                        Some(when) => {
                            if !self.keep_departures && now - when >= self.gc_threshold_departed {
                                evictions.push(match side {
                                    Side::Station => (inner.clone(), outer.clone()),
                                    Side::Train => (outer.clone(), inner.clone()),
                                });
                            }
                        }
                    }
                } else if self.overdue(train, now) {
                    self.mark_departed(train, now, side, metrics);
                }
            }
        }
        evictions
    }

    fn overdue(&self, train: &Train, now: DateTime<Utc>) -> bool {
        let threshold = if train.synthetic {
            self.gc_threshold_static
        } else {
            self.gc_threshold
        };
        train.current_departure < now - threshold
    }

    fn mark_departed(&self, train: &mut Train, now: DateTime<Utc>, side: Side, metrics: &Metrics) {
        train.status = STATUS_DEPARTED.to_owned();
        train.departed_timestamp = Some(now);

        if train.is_cancelled() {
            log::debug!(
                "cancelled train {} at {} marked departed",
                train.train_number,
                train.trip_station.code
            );
        } else if train.synthetic {
            log::debug!(
                "injected train {} at {} marked departed",
                train.train_number,
                train.trip_station.code
            );
        } else {
            log::warn!(
                "train {} at {} never reported departure, marking departed",
                train.train_number,
                train.trip_station.code
            );
            match side {
                Side::Station => metrics.count_gc_station(),
                Side::Train => metrics.count_gc_train(),
            }
        }
    }
}

/// The periodic task around the engine: sweep, then feed the downtime
/// detector with the current message counter.
pub struct LifecycleTask {
    ctx: Context,
    engine: LifecycleEngine,
    interval: tokio::time::Interval,
    shutdown: CancellationToken,
}

impl LifecycleTask {
    pub fn new(ctx: Context, config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            engine: LifecycleEngine::new(config),
            interval: tokio::time::interval(std::time::Duration::from_secs(TICK_SECONDS)),
            shutdown,
        }
    }
}

#[async_trait]
impl Task for LifecycleTask {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "lifecycle"
    }

    async fn run(&mut self) -> Result<Continuation, Infallible> {
        tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Continuation::Exit),
            _ = self.interval.tick() => {}
        }

        let now = Utc::now();
        self.engine.tick(&self.ctx.store, &self.ctx.metrics, now).await;

        let messages = self.ctx.metrics.messages();
        self.ctx.health.write().await.sample(messages, now);

        Ok(Continuation::Continue)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::config::Bindings;
    use crate::testutil;

    use super::*;

    fn engine() -> LifecycleEngine {
        LifecycleEngine::new(&test_config(false))
    }

    fn test_config(keep_departures: bool) -> Config {
        let mut config = Config {
            bindings: Bindings {
                dvs_server: String::new(),
                client_server: String::new(),
                injector_server: String::new(),
            },
            zmq: Default::default(),
            downtime_detection: Default::default(),
            garbage_collection: Default::default(),
            debug: Default::default(),
            persistence: None,
        };
        config.debug.keep_departures = keep_departures;
        config
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 4, 12, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn overdue_train_is_marked_departed() {
        let ctx = testutil::context();
        let engine = engine();

        // departure 11 minutes ago, past the 10 minute threshold
        let train = testutil::train("1234", "RTD", t0(), t0() - Duration::minutes(11));
        ctx.store.apply(train, t0()).await;

        engine.tick(&ctx.store, &ctx.metrics, t0()).await;

        let bucket = ctx.store.station_snapshot("RTD").await.unwrap();
        assert!(bucket["1234"].is_departed());
        assert_eq!(bucket["1234"].departed_timestamp, Some(t0()));
        let bucket = ctx.store.train_snapshot("1234").await.unwrap();
        assert!(bucket["RTD"].is_departed());

        // both sweeps noticed the silent departure
        assert_eq!(ctx.metrics.counter("gc_station"), Some(1));
        assert_eq!(ctx.metrics.counter("gc_trein"), Some(1));
    }

    #[tokio::test]
    async fn train_within_threshold_is_left_alone() {
        let ctx = testutil::context();
        let engine = engine();

        let train = testutil::train("1234", "RTD", t0(), t0() - Duration::minutes(9));
        ctx.store.apply(train, t0()).await;

        engine.tick(&ctx.store, &ctx.metrics, t0()).await;

        let bucket = ctx.store.station_snapshot("RTD").await.unwrap();
        assert!(!bucket["1234"].is_departed());
        assert_eq!(ctx.metrics.counter("gc_station"), Some(0));
    }

    #[tokio::test]
    async fn synthetic_train_departs_immediately_without_counting() {
        let ctx = testutil::context();
        let engine = engine();

        let mut train = testutil::train("i42", "RTD", t0(), t0() - Duration::seconds(30));
        train.synthetic = true;
        ctx.store.apply(train, t0()).await;

        engine.tick(&ctx.store, &ctx.metrics, t0()).await;

        let bucket = ctx.store.station_snapshot("RTD").await.unwrap();
        assert!(bucket["i42"].is_departed());
        assert_eq!(ctx.metrics.counter("gc_station"), Some(0));
        assert_eq!(ctx.metrics.counter("gc_trein"), Some(0));
    }

    #[tokio::test]
    async fn departed_train_is_evicted_after_retention_window() {
        let ctx = testutil::context();
        let engine = engine();

        let mut train = testutil::train("1234", "RTD", t0(), t0());
        train.status = STATUS_DEPARTED.to_owned();
        ctx.store.apply(train, t0()).await;

        // still inside the retention window: stays queryable
        engine
            .tick(&ctx.store, &ctx.metrics, t0() + Duration::minutes(119))
            .await;
        assert!(ctx.store.train_snapshot("1234").await.is_some());

        engine
            .tick(&ctx.store, &ctx.metrics, t0() + Duration::minutes(121))
            .await;
        assert!(ctx.store.station_snapshot("RTD").await.unwrap().is_empty());
        assert_eq!(ctx.store.train_snapshot("1234").await, None);
    }

    #[tokio::test]
    async fn missing_departed_timestamp_is_backfilled() {
        let ctx = testutil::context();
        let engine = engine();

        let mut train = testutil::train("1234", "RTD", t0(), t0());
        train.status = STATUS_DEPARTED.to_owned();
        // a restored snapshot may carry departed trains without a stamp
        let mut index = Index::new();
        index
            .entry("RTD".to_owned())
            .or_default()
            .insert("1234".to_owned(), train);
        ctx.store.restore_station_index(index).await;

        engine.tick(&ctx.store, &ctx.metrics, t0()).await;

        let bucket = ctx.store.station_snapshot("RTD").await.unwrap();
        assert_eq!(bucket["1234"].departed_timestamp, Some(t0()));
    }

    #[tokio::test]
    async fn keep_departures_skips_eviction() {
        let ctx = testutil::context();
        let engine = LifecycleEngine::new(&test_config(true));

        let mut train = testutil::train("1234", "RTD", t0(), t0());
        train.status = STATUS_DEPARTED.to_owned();
        ctx.store.apply(train, t0()).await;

        engine
            .tick(&ctx.store, &ctx.metrics, t0() + Duration::minutes(500))
            .await;
        assert!(!ctx.store.station_snapshot("RTD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_train_departs_quietly() {
        let ctx = testutil::context();
        let engine = engine();

        let mut train = testutil::train("1234", "RTD", t0(), t0() - Duration::minutes(11));
        train
            .modifications
            .push(model::Modification::new(model::ModificationKind::Cancelled));
        ctx.store.apply(train, t0()).await;

        engine.tick(&ctx.store, &ctx.metrics, t0()).await;

        let bucket = ctx.store.station_snapshot("RTD").await.unwrap();
        assert!(bucket["1234"].is_departed());
        // cancelled trains are expected to never report status 5
        assert_eq!(ctx.metrics.counter("gc_station"), Some(0));
    }
}
