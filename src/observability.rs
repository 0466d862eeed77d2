//! Counters for the bot's request flow

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    links_received: AtomicU64,
    offers_shown: AtomicU64,
    fallbacks: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
    expired_selections: AtomicU64,
    saturated: AtomicU64,
}

macro_rules! counter {
    ($method:ident, $field:ident) => {
        pub fn $method(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(counter = stringify!($field), "Metric incremented");
        }
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(link_received, links_received);
    counter!(offers_shown, offers_shown);
    counter!(fallback_started, fallbacks);
    counter!(delivered, deliveries);
    counter!(failed, failures);
    counter!(selection_expired, expired_selections);
    counter!(queue_saturated, saturated);

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            links_received: self.links_received.load(Ordering::Relaxed),
            offers_shown: self.offers_shown.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            expired_selections: self.expired_selections.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub links_received: u64,
    pub offers_shown: u64,
    pub fallbacks: u64,
    pub deliveries: u64,
    pub failures: u64,
    pub expired_selections: u64,
    pub saturated: u64,
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.link_received();
        metrics.link_received();
        metrics.fallback_started();
        metrics.queue_saturated();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.links_received, 2);
        assert_eq!(snapshot.fallbacks, 1);
        assert_eq!(snapshot.saturated, 1);
        assert_eq!(snapshot.deliveries, 0);
    }
}
