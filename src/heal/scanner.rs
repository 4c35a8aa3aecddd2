//! Lazy, forward-only walk over a job's pending lines

use crate::heal::store::{parse_line, pio, read_line, StatusWriter};
use crate::heal::types::{byte_needs_processing, HealItemStatus};
use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One list line still waiting for a heal.
pub struct HealWorkItem {
    pub line: u64,
    pub bucket: String,
    pub key: String,
    /// Byte found in the status record when the line was scanned
    pub previous: u8,
    writer: StatusWriter,
}

impl HealWorkItem {
    /// Record the outcome of this line.
    pub async fn persist(&self, status: HealItemStatus) -> io::Result<()> {
        self.writer.persist(status).await
    }
}

/// What a scan saw on its way through the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub lines: u64,
    pub offered: u64,
    pub skipped_terminal: u64,
    pub malformed: u64,
    pub unknown_status: u64,
    /// Stopped by cancellation or because nobody was receiving
    pub interrupted: bool,
}

pub struct HealScanner {
    list: Arc<File>,
    status: Arc<File>,
}

enum Offer {
    Sent,
    Stop,
}

impl HealScanner {
    pub fn new(list: Arc<File>, status: Arc<File>) -> Self {
        Self { list, status }
    }

    /// Run the scan on a blocking thread feeding a queue of `capacity` items.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        self,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<HealWorkItem>, JoinHandle<ScanSummary>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Handle::current();
        let task = tokio::task::spawn_blocking(move || {
            self.scan(|item| {
                let sent = handle.block_on(async {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        sent = tx.send(item) => sent.is_ok(),
                    }
                });
                if sent {
                    Offer::Sent
                } else {
                    Offer::Stop
                }
            })
        });
        (rx, task)
    }

    fn scan<F>(self, mut offer: F) -> ScanSummary
    where
        F: FnMut(HealWorkItem) -> Offer,
    {
        let mut summary = ScanSummary::default();
        let mut list = &*self.list;
        if let Err(e) = list.seek(SeekFrom::Start(0)) {
            error!("Failed to rewind object list: {}", e);
            return summary;
        }

        let mut reader = BufReader::new(list);
        let mut buf = Vec::new();
        let mut line = 0u64;
        loop {
            match read_line(&mut reader, &mut buf) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(line, "Failed to read object list: {}", e);
                    break;
                }
            }
            summary.lines += 1;
            let offset = line;
            line += 1;

            let previous = match pio::read_byte_at(&self.status, offset) {
                Ok(byte) => byte,
                Err(e) => {
                    error!(line = offset, "Failed to read status record: {}", e);
                    break;
                }
            };
            if !byte_needs_processing(previous) {
                summary.skipped_terminal += 1;
                continue;
            }
            if HealItemStatus::decode(previous).is_none() {
                warn!(line = offset, status = previous, "Unknown status code, healing again");
                summary.unknown_status += 1;
            }

            let Some((bucket, key)) = std::str::from_utf8(&buf).ok().and_then(parse_line) else {
                warn!(line = offset, content = %String::from_utf8_lossy(&buf), "Skipping malformed line");
                summary.malformed += 1;
                continue;
            };

            let item = HealWorkItem {
                line: offset,
                bucket: bucket.to_string(),
                key: key.to_string(),
                previous,
                writer: StatusWriter::new(Arc::clone(&self.status), offset),
            };
            match offer(item) {
                Offer::Sent => summary.offered += 1,
                Offer::Stop => {
                    summary.interrupted = true;
                    break;
                }
            }
        }

        debug!(?summary, "Object list scan finished");
        summary
    }
}
