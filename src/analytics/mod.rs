//! # Analytics Aggregation
//!
//! Lightweight usage counters over the HTTP boundary: webhook deliveries,
//! sync polls, and full-refresh runs, each tagged by family. This is
//! deliberately thin — there's no storage/export/reporting pipeline here,
//! just the collector and windowed aggregator wired to the handful of
//! operations that actually touch the cache and stream core. A disabled
//! [`crate::config::AppConfig::analytics_enabled`] makes every call here a
//! no-op rather than skipping the call sites.

pub mod collector;

pub use collector::{Metric, MetricType, MetricValue, MetricsCollector};

/// Records operation outcomes for the handful of endpoints analytics
/// cares about. Disabled at construction time rather than per-call, so a
/// deployment with `analytics_enabled = false` pays no synchronization
/// cost recording metrics nobody reads.
pub struct Recorder {
    collector: MetricsCollector,
    enabled: bool,
}

impl Recorder {
    pub fn new(enabled: bool) -> Self {
        Self { collector: MetricsCollector::new(), enabled }
    }

    /// Record one webhook delivery outcome for `family`.
    pub fn record_webhook(&self, family: &str, changed: bool) {
        if !self.enabled {
            return;
        }
        self.collector.record_operation_execution(&format!("webhook.{family}"), 0.0, changed);
    }

    /// Record one sync poll for `family`, with how many deltas it returned.
    pub fn record_sync(&self, family: &str, entries_returned: usize) {
        if !self.enabled {
            return;
        }
        self.collector.increment_counter(&format!("sync.{family}.requests"), 1);
        self.collector.set_gauge(&format!("sync.{family}.last_batch_size"), entries_returned as f64);
    }

    /// Record one full-refresh run.
    pub fn record_refresh(&self, total_updated: u64, total_errors: u64) {
        if !self.enabled {
            return;
        }
        self.collector.increment_counter("refresh.runs", 1);
        self.collector.set_gauge("refresh.last_updated", total_updated as f64);
        self.collector.set_gauge("refresh.last_errors", total_errors as f64);
    }

    /// Snapshot every counter and gauge currently tracked.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.collector.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_recorder_records_nothing() {
        let recorder = Recorder::new(false);
        recorder.record_webhook("product", true);
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn enabled_recorder_tracks_webhook_outcomes() {
        let recorder = Recorder::new(true);
        recorder.record_webhook("product", true);
        recorder.record_webhook("product", false);
        assert_eq!(recorder.collector.get_counter("webhook.product.total"), Some(2));
        assert_eq!(recorder.collector.get_counter("webhook.product.success"), Some(1));
        assert_eq!(recorder.collector.get_counter("webhook.product.failure"), Some(1));
    }

    #[test]
    fn sync_recording_tracks_request_count_and_batch_size() {
        let recorder = Recorder::new(true);
        recorder.record_sync("price", 5);
        recorder.record_sync("price", 2);
        assert_eq!(recorder.collector.get_counter("sync.price.requests"), Some(2));
        assert_eq!(recorder.collector.get_gauge("sync.price.last_batch_size"), Some(2.0));
    }
}
