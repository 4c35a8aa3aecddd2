//! Metrics and observability module
//!
//! Records through the `metrics` facade; whichever recorder the host binary
//! installs receives them. Nothing is exported from here.
//!
//! Key metrics:
//! - Maintenance polls and session outcomes per node
//! - Cleanup results per node
//! - Heal item outcomes by status, worker exits, pending items
//! - Time spent waiting on the per-server rate limiter

pub mod recorder;

pub use recorder::{
    init_metrics, record_cleanup, record_heal_item, record_heal_worker_exit,
    record_maintenance_poll, record_maintenance_started, record_rate_limit_wait,
    record_session_finished, set_heal_pending, HealRunMetrics,
};
