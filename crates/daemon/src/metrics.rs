use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic daemon counters, incremented from several tasks. The names on
/// the client channel are stable: msg, dubbel, ouder, gc_station, gc_trein,
/// injecties.
#[derive(Debug, Default)]
pub struct Metrics {
    messages: AtomicU64,
    duplicates: AtomicU64,
    stale: AtomicU64,
    gc_station: AtomicU64,
    gc_train: AtomicU64,
    injections: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_gc_station(&self) {
        self.gc_station.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_gc_train(&self) {
        self.gc_train.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_injection(&self) {
        self.injections.fetch_add(1, Ordering::Relaxed);
    }

    /// Total processed feed messages, success or failure.
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Look up a counter under its external name.
    pub fn counter(&self, name: &str) -> Option<u64> {
        let counter = match name {
            "msg" => &self.messages,
            "dubbel" => &self.duplicates,
            "ouder" => &self.stale,
            "gc_station" => &self.gc_station,
            "gc_trein" => &self.gc_train,
            "injecties" => &self.injections,
            _ => return None,
        };
        Some(counter.load(Ordering::Relaxed))
    }
}
