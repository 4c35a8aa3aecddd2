//! Aggregate heal progress, owned by a single reporting task

use crate::client::{HealDriveInfo, HealResultItem};
use crate::maintenance::render::{format_duration, rewind_lines};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const BAR_WIDTH: usize = 20;

/// Object health by how many spare drives it has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthColor {
    Green,
    Yellow,
    Red,
    Grey,
}

impl HealthColor {
    pub const DISPLAY_ORDER: [HealthColor; 4] = [
        HealthColor::Green,
        HealthColor::Yellow,
        HealthColor::Red,
        HealthColor::Grey,
    ];

    /// Green with every parity drive online, Red with none to spare, Grey
    /// when the data can no longer be read.
    pub fn classify(online: usize, data: usize, parity: usize) -> Self {
        if online < data {
            HealthColor::Grey
        } else if online >= data + parity {
            HealthColor::Green
        } else if online == data {
            HealthColor::Red
        } else {
            HealthColor::Yellow
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            HealthColor::Green => "no part corrupted",
            HealthColor::Yellow => "missing parts",
            HealthColor::Red => "one foot in the grave",
            HealthColor::Grey => "died",
        }
    }
}

/// Colors of an item before and after its heal.
pub fn item_health(item: &HealResultItem) -> (HealthColor, HealthColor) {
    let (data, parity) = item.erasure_layout();
    let (before, after) = item.online_counts();
    (
        HealthColor::classify(before, data, parity),
        HealthColor::classify(after, data, parity),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub scanned: u64,
    pub healed: u64,
    pub bytes_scanned: u64,
    pub colors: BTreeMap<HealthColor, u64>,
    pub elapsed: Duration,
}

impl ProgressCounters {
    pub fn color(&self, color: HealthColor) -> u64 {
        self.colors.get(&color).copied().unwrap_or(0)
    }
}

/// Handle healers use to hand results to the reporter.
///
/// Results are dropped rather than blocking a healer when the reporter
/// falls behind.
#[derive(Clone)]
pub struct HealProgress {
    tx: mpsc::Sender<HealResultItem>,
}

impl HealProgress {
    pub fn report(&self, item: HealResultItem) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                trace!(bucket = %item.bucket, object = %item.object, "Progress queue full, dropping result");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Summary redrawn in place every interval
    InPlace,
    /// One JSON record per result
    Json,
}

pub struct ProgressReporter<W: Write> {
    rx: mpsc::Receiver<HealResultItem>,
    counters: ProgressCounters,
    total: u64,
    started: Instant,
    current: String,
    mode: ProgressMode,
    interval: Duration,
    out: W,
    lines_written: usize,
}

/// Create a reporter and the handle that feeds it.
pub fn progress_channel<W: Write>(
    capacity: usize,
    total: u64,
    mode: ProgressMode,
    interval: Duration,
    out: W,
) -> (HealProgress, ProgressReporter<W>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let reporter = ProgressReporter {
        rx,
        counters: ProgressCounters::default(),
        total,
        started: Instant::now(),
        current: String::new(),
        mode,
        interval,
        out,
        lines_written: 0,
    };
    (HealProgress { tx }, reporter)
}

impl<W: Write> ProgressReporter<W> {
    pub fn record(&mut self, item: &HealResultItem) {
        let (_, after_color) = item_health(item);
        let (online_before, online_after) = item.online_counts();

        self.counters.scanned += 1;
        self.counters.bytes_scanned += item.object_size;
        if online_after > online_before {
            self.counters.healed += 1;
        }
        *self.counters.colors.entry(after_color).or_default() += 1;
        self.current = format!("{}/{}", item.bucket, item.object);
    }

    pub fn counters(&self) -> ProgressCounters {
        ProgressCounters {
            elapsed: self.started.elapsed(),
            ..self.counters.clone()
        }
    }

    pub fn render_lines(&self) -> Vec<String> {
        let counters = self.counters();
        let mut lines = vec![
            format!("Healing: {}", self.current),
            format!(
                "  {} objects total, {} scanned, {} healed; {} in {}",
                self.total,
                counters.scanned,
                counters.healed,
                format_bytes(counters.bytes_scanned),
                format_duration(counters.elapsed)
            ),
        ];

        for color in HealthColor::DISPLAY_ORDER {
            let count = counters.color(color);
            let percent = if counters.scanned == 0 {
                0.0
            } else {
                count as f64 * 100.0 / counters.scanned as f64
            };
            let bar = "█".repeat((percent / 100.0 * BAR_WIDTH as f64).round() as usize);
            lines.push(format!(
                "  {:<22} {:>10} {:>5.1}% {}",
                color.description(),
                count,
                percent,
                bar
            ));
        }
        lines
    }

    fn render(&mut self) -> io::Result<()> {
        rewind_lines(&mut self.out, self.lines_written)?;
        let lines = self.render_lines();
        for line in &lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        self.lines_written = lines.len();
        Ok(())
    }

    fn print_json(&mut self, item: &HealResultItem) -> io::Result<()> {
        let record = HealRecord::new(item);
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Consume results until every handle is dropped or `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> io::Result<ProgressCounters> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dirty = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => {
                        self.record(&item);
                        match self.mode {
                            ProgressMode::Json => self.print_json(&item)?,
                            ProgressMode::InPlace => dirty = true,
                        }
                    }
                    None => break,
                },
                _ = ticker.tick(), if self.mode == ProgressMode::InPlace => {
                    if dirty {
                        self.render()?;
                        dirty = false;
                    }
                }
            }
        }

        if dirty {
            self.render()?;
        }
        let counters = self.counters();
        debug!(scanned = counters.scanned, healed = counters.healed, "Progress reporter stopped");
        Ok(counters)
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

#[derive(Serialize)]
struct DriveSummary<'a> {
    color: HealthColor,
    offline: usize,
    online: usize,
    missing: usize,
    corrupted: usize,
    drives: &'a [HealDriveInfo],
}

#[derive(Serialize)]
struct HealRecord<'a> {
    status: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    before: DriveSummary<'a>,
    after: DriveSummary<'a>,
    size: u64,
}

impl<'a> HealRecord<'a> {
    fn new(item: &'a HealResultItem) -> Self {
        let (before_color, after_color) = item_health(item);
        let (online_before, online_after) = item.online_counts();
        let (missing_before, missing_after) = item.missing_counts();
        let (corrupted_before, corrupted_after) = item.corrupted_counts();
        let (offline_before, offline_after) = item.offline_counts();

        Self {
            status: "success",
            kind: "object",
            name: format!("{}/{}", item.bucket, item.object),
            before: DriveSummary {
                color: before_color,
                offline: offline_before,
                online: online_before,
                missing: missing_before,
                corrupted: corrupted_before,
                drives: &item.before,
            },
            after: DriveSummary {
                color: after_color,
                offline: offline_after,
                online: online_after,
                missing: missing_after,
                corrupted: corrupted_after,
                drives: &item.after,
            },
            size: item.object_size,
        }
    }
}

/// Binary-unit size, e.g. `1.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
