//! Rate-limited workers draining the scanner's queue
//!
//! Each healer (one per server) gets `qps` workers and its own token bucket
//! admitting `qps` heals per second with a burst of one. All workers pull
//! from the same queue.

use crate::heal::error::{HealError, HealResult};
use crate::heal::scanner::{HealScanner, HealWorkItem, ScanSummary};
use crate::heal::types::HealItemStatus;
use crate::metrics;
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
type SharedQueue = Arc<Mutex<mpsc::Receiver<HealWorkItem>>>;

/// Heals one object and decides the status to persist for it.
#[async_trait]
pub trait ObjectHealer: Send + Sync {
    /// Label used in logs
    fn name(&self) -> String;

    /// An error stops the calling worker; the item stays pending.
    async fn heal(&self, bucket: &str, key: &str) -> HealResult<HealItemStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Queue closed after the scan finished
    Drained,
    Cancelled,
    Failed(String),
}

impl WorkerExit {
    fn as_label(&self) -> &'static str {
        match self {
            WorkerExit::Drained => "drained",
            WorkerExit::Cancelled => "cancelled",
            WorkerExit::Failed(_) => "failed",
        }
    }
}

/// What one worker did before it stopped.
#[derive(Debug, Clone)]
pub struct WorkerTally {
    pub healer: String,
    pub processed: u64,
    pub by_status: BTreeMap<HealItemStatus, u64>,
    pub exit: WorkerExit,
}

#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub processed: u64,
    pub by_status: BTreeMap<HealItemStatus, u64>,
    pub workers: Vec<WorkerTally>,
    pub scan: ScanSummary,
}

impl PoolReport {
    pub fn count(&self, status: HealItemStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerTally> {
        self.workers
            .iter()
            .filter(|w| matches!(w.exit, WorkerExit::Failed(_)))
    }

    fn absorb(&mut self, tally: WorkerTally) {
        self.processed += tally.processed;
        for (status, n) in &tally.by_status {
            *self.by_status.entry(*status).or_default() += n;
        }
        self.workers.push(tally);
    }
}

pub struct WorkerPool {
    healers: Vec<Arc<dyn ObjectHealer>>,
    qps: u32,
}

impl WorkerPool {
    pub fn new(healers: Vec<Arc<dyn ObjectHealer>>, qps: u32) -> HealResult<Self> {
        if healers.is_empty() {
            return Err(HealError::NoHealers);
        }
        if qps == 0 {
            return Err(HealError::InvalidQps(qps));
        }
        Ok(Self { healers, qps })
    }

    pub fn worker_count(&self) -> usize {
        self.healers.len() * self.qps as usize
    }

    fn limiter(&self) -> HealResult<DirectLimiter> {
        let period = Duration::from_secs(1) / self.qps;
        let quota = Quota::with_period(period)
            .ok_or(HealError::InvalidQps(self.qps))?
            .allow_burst(NonZeroU32::MIN);
        Ok(RateLimiter::direct(quota))
    }

    /// Scan and heal until the list is exhausted, every worker has stopped,
    /// or `cancel` fires.
    pub async fn run(&self, scanner: HealScanner, cancel: &CancellationToken) -> HealResult<PoolReport> {
        let limiters = self
            .healers
            .iter()
            .map(|_| self.limiter().map(Arc::new))
            .collect::<HealResult<Vec<_>>>()?;

        let workers_cancel = cancel.child_token();
        let (rx, scan_task) = scanner.spawn(1, workers_cancel.clone());
        let queue: SharedQueue = Arc::new(Mutex::new(rx));

        info!(
            healers = self.healers.len(),
            workers = self.worker_count(),
            qps = self.qps,
            "Starting heal workers"
        );

        let mut handles = Vec::with_capacity(self.worker_count());
        for (healer, limiter) in self.healers.iter().zip(&limiters) {
            for _ in 0..self.qps {
                handles.push(tokio::spawn(run_worker(
                    Arc::clone(healer),
                    Arc::clone(limiter),
                    Arc::clone(&queue),
                    workers_cancel.clone(),
                )));
            }
        }
        // the scanner stops once the last worker drops the queue
        drop(queue);

        let mut report = PoolReport::default();
        let mut join_error = None;
        for handle in handles {
            match handle.await {
                Ok(tally) => report.absorb(tally),
                Err(e) => {
                    error!("Heal worker task failed: {}", e);
                    workers_cancel.cancel();
                    join_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        report.scan = scan_task
            .await
            .map_err(|e| HealError::Task(e.to_string()))?;
        if let Some(e) = join_error {
            return Err(HealError::Task(e));
        }

        info!(
            processed = report.processed,
            offered = report.scan.offered,
            "Heal workers finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    healer: Arc<dyn ObjectHealer>,
    limiter: Arc<DirectLimiter>,
    queue: SharedQueue,
    cancel: CancellationToken,
) -> WorkerTally {
    let mut tally = WorkerTally {
        healer: healer.name(),
        processed: 0,
        by_status: BTreeMap::new(),
        exit: WorkerExit::Drained,
    };

    tally.exit = loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => Some(item),
            }
        };
        let item = match next {
            None => break WorkerExit::Cancelled,
            Some(None) => break WorkerExit::Drained,
            Some(Some(item)) => item,
        };

        let waited = Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerExit::Cancelled,
            _ = limiter.until_ready() => {}
        }
        metrics::record_rate_limit_wait(waited.elapsed());

        // an abandoned heal leaves the item pending for the next run
        let healed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerExit::Cancelled,
            healed = healer.heal(&item.bucket, &item.key) => healed,
        };
        let status = match healed {
            Ok(status) => status,
            Err(e) => {
                error!(healer = %tally.healer, line = item.line, bucket = %item.bucket, key = %item.key, "Heal failed: {}", e);
                break WorkerExit::Failed(e.to_string());
            }
        };
        if let Err(e) = item.persist(status).await {
            error!(line = item.line, "Failed to persist heal status: {}", e);
            break WorkerExit::Failed(e.to_string());
        }

        debug!(line = item.line, status = %status, "Healed");
        metrics::record_heal_item(status.as_label());
        tally.processed += 1;
        *tally.by_status.entry(status).or_default() += 1;
    };

    metrics::record_heal_worker_exit(tally.exit.as_label());
    debug!(healer = %tally.healer, processed = tally.processed, exit = ?tally.exit, "Heal worker stopped");
    tally
}
