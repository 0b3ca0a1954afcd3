use std::sync::Arc;

use tokio::sync::RwLock;

pub mod config;
pub mod health;
pub mod ingest;
pub mod injector;
pub mod lifecycle;
pub mod metrics;
pub mod persistence;
pub mod query;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testutil;

use crate::config::Config;
use crate::health::HealthDetector;
use crate::metrics::Metrics;
use crate::store::Store;

/// Shared handles passed to every task. The health detector is written only
/// by the lifecycle task; the query server reads it for the status replies.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<Store>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<RwLock<HealthDetector>>,
}

impl Context {
    pub fn new(config: &Config) -> Self {
        Self {
            store: Arc::new(Store::new()),
            metrics: Arc::new(Metrics::new()),
            health: Arc::new(RwLock::new(HealthDetector::new(&config.downtime_detection))),
        }
    }
}
