//! Fan-in of every node's latest snapshot into one live table
//!
//! Each tick the aggregator reads all relays once. A node whose relay has
//! closed contributes nothing; a round in which nobody contributes means
//! every session is done.

use crate::maintenance::error::MaintenanceResult;
use crate::maintenance::relay::RelayReceiver;
use crate::maintenance::render::{render_table, rewind_lines};
use crate::maintenance::types::MaintenanceSnapshot;
use chrono::Utc;
use std::io::{self, Write};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorExit {
    /// A round produced no update: every session has closed
    Completed,
    /// Operator interrupt
    Cancelled,
}

pub struct MaintenanceAggregator<W: Write> {
    feeds: Vec<RelayReceiver>,
    latest: Vec<Option<MaintenanceSnapshot>>,
    interval: Duration,
    out: W,
    lines_written: usize,
    rounds: u64,
}

impl<W: Write> MaintenanceAggregator<W> {
    pub fn new(feeds: Vec<RelayReceiver>, interval: Duration, out: W) -> Self {
        let latest = vec![None; feeds.len()];
        Self {
            feeds,
            latest,
            interval,
            out,
            lines_written: 0,
            rounds: 0,
        }
    }

    /// Read every node once. Returns the number of nodes that produced an
    /// update, or `None` if cancelled mid-round.
    pub async fn collect_round(&mut self, cancel: &CancellationToken) -> Option<usize> {
        let mut updated = 0;
        for (feed, latest) in self.feeds.iter().zip(self.latest.iter_mut()) {
            match feed.recv(cancel).await {
                Some(snapshot) => {
                    *latest = Some(snapshot);
                    updated += 1;
                }
                None if cancel.is_cancelled() => return None,
                None => {}
            }
        }
        Some(updated)
    }

    /// Redraw the table over the previous one.
    pub fn render(&mut self) -> io::Result<()> {
        rewind_lines(&mut self.out, self.lines_written)?;

        let rows: Vec<&MaintenanceSnapshot> = self.latest.iter().flatten().collect();
        let lines = render_table(&rows, Utc::now());
        for line in &lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;

        self.lines_written = lines.len();
        Ok(())
    }

    /// Tick until every session has closed or `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> MaintenanceResult<AggregatorExit> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(AggregatorExit::Cancelled),
                _ = ticker.tick() => {}
            }

            match self.collect_round(cancel).await {
                None => return Ok(AggregatorExit::Cancelled),
                Some(0) => {
                    debug!(rounds = self.rounds, "all maintenance sessions closed");
                    return Ok(AggregatorExit::Completed);
                }
                Some(_) => {
                    self.render()?;
                    self.rounds += 1;
                }
            }
        }
    }

    /// Latest snapshot per node, in feed order.
    pub fn snapshots(&self) -> &[Option<MaintenanceSnapshot>] {
        &self.latest
    }

    /// Rounds that produced at least one update.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn into_output(self) -> W {
        self.out
    }
}
