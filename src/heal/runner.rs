//! Healing an object list end to end: open the job, heal what is pending,
//! report where it stands.

use crate::client::{HealOpts, NodeClient};
use crate::heal::error::{HealError, HealResult};
use crate::heal::healer::NodeHealer;
use crate::heal::pool::{ObjectHealer, PoolReport, WorkerPool};
use crate::heal::progress::{progress_channel, ProgressCounters, ProgressMode};
use crate::heal::reconcile::TargetSet;
use crate::heal::store::HealJobStore;
use crate::heal::types::{HealJobConfig, StatusTally};
use crate::metrics::HealRunMetrics;
use crate::prompt::Confirm;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PROGRESS_QUEUE: usize = 1000;

#[derive(Debug, Clone)]
pub struct HealRunReport {
    pub job_dir: PathBuf,
    pub before: StatusTally,
    pub after: StatusTally,
    /// `None` when nothing was left to heal
    pub pool: Option<PoolReport>,
    pub progress: Option<ProgressCounters>,
}

impl HealRunReport {
    pub fn is_complete(&self) -> bool {
        self.after.is_complete()
    }
}

/// Heal every pending line of `list_file` through `healers`.
///
/// Opens (or resumes) the job, runs the worker pool, then closes the job.
/// A job with nothing pending does no work.
pub async fn heal_object_list(
    config: &HealJobConfig,
    list_file: &Path,
    healers: Vec<Arc<dyn ObjectHealer>>,
    confirm: &dyn Confirm,
    cancel: &CancellationToken,
) -> HealResult<HealRunReport> {
    let pool = WorkerPool::new(healers, config.qps)?;
    let store = HealJobStore::open(&config.work_dir, list_file, confirm)?;
    let before = store.tally()?;

    if before.is_complete() {
        return finish_complete(store, before);
    }
    run_job(store, before, pool, cancel).await
}

/// Heals an object list through every server, with a live progress view.
pub struct HealRunner {
    config: HealJobConfig,
    opts: HealOpts,
    targets: Arc<TargetSet>,
}

impl HealRunner {
    pub fn new(config: HealJobConfig, opts: HealOpts, targets: TargetSet) -> Self {
        Self {
            config,
            opts,
            targets: Arc::new(targets),
        }
    }

    pub async fn run<W: Write + Send + 'static>(
        &self,
        list_file: &Path,
        clients: &[Arc<dyn NodeClient>],
        out: W,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> HealResult<HealRunReport> {
        if clients.is_empty() {
            return Err(HealError::NoHealers);
        }
        if self.config.qps == 0 {
            return Err(HealError::InvalidQps(0));
        }
        let store = HealJobStore::open(&self.config.work_dir, list_file, confirm)?;
        let before = store.tally()?;
        if before.is_complete() {
            return finish_complete(store, before);
        }

        let mode = if self.config.json {
            ProgressMode::Json
        } else {
            ProgressMode::InPlace
        };
        let (progress, mut reporter) = progress_channel(
            PROGRESS_QUEUE,
            store.line_count(),
            mode,
            self.config.progress_interval,
            out,
        );
        let reporter_cancel = cancel.clone();
        let reporter_task = tokio::spawn(async move { reporter.run(&reporter_cancel).await });

        let healers: Vec<Arc<dyn ObjectHealer>> = clients
            .iter()
            .map(|client| {
                Arc::new(
                    NodeHealer::new(Arc::clone(client), self.opts.clone(), Arc::clone(&self.targets))
                        .with_progress(progress.clone()),
                ) as Arc<dyn ObjectHealer>
            })
            .collect();
        drop(progress);

        let pool = WorkerPool::new(healers, self.config.qps)?;
        let result = run_job(store, before, pool, cancel).await;

        // every progress handle is gone once the pool is, which ends the reporter
        let counters = match reporter_task.await {
            Ok(Ok(counters)) => Some(counters),
            Ok(Err(e)) => {
                warn!("Progress display failed: {}", e);
                None
            }
            Err(e) => return Err(HealError::Task(e.to_string())),
        };

        let mut report = result?;
        report.progress = counters;
        Ok(report)
    }
}

fn finish_complete(store: HealJobStore, before: StatusTally) -> HealResult<HealRunReport> {
    info!(dir = %store.dir().display(), "Heal job already complete, nothing to do");
    let job_dir = store.dir().to_path_buf();
    store.close()?;
    Ok(HealRunReport {
        job_dir,
        after: before.clone(),
        before,
        pool: None,
        progress: None,
    })
}

async fn run_job(
    store: HealJobStore,
    before: StatusTally,
    pool: WorkerPool,
    cancel: &CancellationToken,
) -> HealResult<HealRunReport> {
    info!(
        dir = %store.dir().display(),
        lines = store.line_count(),
        pending = before.pending(),
        "Healing object list"
    );
    let run_metrics = HealRunMetrics::start(before.pending());

    let result = pool.run(store.scanner(), cancel).await;
    drop(pool);

    let after = store.tally()?;
    run_metrics.finish(after.pending());
    let job_dir = store.dir().to_path_buf();
    store.close()?;
    let pool_report = result?;

    info!(
        dir = %job_dir.display(),
        processed = pool_report.processed,
        pending = after.pending(),
        cancelled = cancel.is_cancelled(),
        "Heal run finished"
    );
    Ok(HealRunReport {
        job_dir,
        before,
        after,
        pool: Some(pool_report),
        progress: None,
    })
}
