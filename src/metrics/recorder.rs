//! Metrics recorder for maintenance and heal operations

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    // Maintenance
    describe_counter!(
        "clustermend_maintenance_polls_total",
        "Maintenance status polls by node and outcome"
    );
    describe_counter!(
        "clustermend_maintenance_started_total",
        "Maintenance runs started by node"
    );
    describe_counter!(
        "clustermend_maintenance_sessions_total",
        "Finished maintenance sessions by outcome"
    );
    describe_counter!(
        "clustermend_maintenance_cleanup_total",
        "Finish-maintenance calls by node and outcome"
    );

    // Heal
    describe_counter!(
        "clustermend_heal_items_total",
        "Heal items processed by resulting status"
    );
    describe_counter!(
        "clustermend_heal_worker_exits_total",
        "Heal workers that stopped, by reason"
    );
    describe_gauge!(
        "clustermend_heal_pending_items",
        "Items of the current job not yet in a terminal state"
    );
    describe_histogram!(
        "clustermend_heal_rate_limit_wait_seconds",
        "Time a heal worker waited for a rate limiter token"
    );
    describe_histogram!(
        "clustermend_heal_run_duration_seconds",
        "Duration of a heal run"
    );
}

// ============== Maintenance ==============

/// Record one status poll
pub fn record_maintenance_poll(endpoint: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("clustermend_maintenance_polls_total", "endpoint" => endpoint.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a successful start request
pub fn record_maintenance_started(endpoint: &str) {
    counter!("clustermend_maintenance_started_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

/// Record a session ending
pub fn record_session_finished(outcome: &'static str) {
    counter!("clustermend_maintenance_sessions_total", "outcome" => outcome).increment(1);
}

/// Record a cleanup call
pub fn record_cleanup(endpoint: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("clustermend_maintenance_cleanup_total", "endpoint" => endpoint.to_string(), "outcome" => outcome)
        .increment(1);
}

// ============== Heal ==============

/// Record a heal item reaching `status`
pub fn record_heal_item(status: &'static str) {
    counter!("clustermend_heal_items_total", "status" => status).increment(1);
}

/// Record a worker leaving its loop
pub fn record_heal_worker_exit(reason: &'static str) {
    counter!("clustermend_heal_worker_exits_total", "reason" => reason).increment(1);
}

/// Update the pending-items gauge
pub fn set_heal_pending(pending: u64) {
    gauge!("clustermend_heal_pending_items").set(pending as f64);
}

/// Record a rate limiter wait
pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("clustermend_heal_rate_limit_wait_seconds").record(waited.as_secs_f64());
}

/// Times a heal run and records its duration when finished
pub struct HealRunMetrics {
    start_time: Instant,
}

impl HealRunMetrics {
    pub fn start(pending: u64) -> Self {
        set_heal_pending(pending);
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop timing and record the remaining pending count
    pub fn finish(self, pending: u64) {
        set_heal_pending(pending);
        histogram!("clustermend_heal_run_duration_seconds").record(self.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Should not panic when called multiple times
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_recording_without_recorder() {
        record_maintenance_poll("10.0.0.1:9000", true);
        record_maintenance_poll("10.0.0.1:9000", false);
        record_session_finished("succeeded");
        record_heal_item("ok");
        record_rate_limit_wait(Duration::from_millis(5));
    }

    #[test]
    fn test_heal_run_metrics() {
        let run = HealRunMetrics::start(10);
        std::thread::sleep(Duration::from_millis(10));
        assert!(run.elapsed() >= Duration::from_millis(10));
        run.finish(0);
    }
}
