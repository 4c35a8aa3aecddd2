use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Version of the byte table used by [`HealItemStatus::encode`].
pub const STATUS_ENCODING_VERSION: u8 = 1;

/// Per-line outcome persisted as one byte in the job's status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealItemStatus {
    /// Not processed yet
    Wait,
    /// Healthy, nothing left to do
    Ok,
    /// The heal call itself failed
    Failed,
    /// Some drives still lack their parts
    MissingParts,
    /// Too few parts left to reconstruct
    CannotBeHealed,
}

impl HealItemStatus {
    pub const ALL: [HealItemStatus; 5] = [
        HealItemStatus::Wait,
        HealItemStatus::Ok,
        HealItemStatus::Failed,
        HealItemStatus::MissingParts,
        HealItemStatus::CannotBeHealed,
    ];

    pub fn encode(self) -> u8 {
        match self {
            HealItemStatus::Wait => b'0',
            HealItemStatus::Ok => b'1',
            HealItemStatus::Failed => b'2',
            HealItemStatus::MissingParts => b'3',
            HealItemStatus::CannotBeHealed => b'4',
        }
    }

    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(HealItemStatus::Wait),
            b'1' => Some(HealItemStatus::Ok),
            b'2' => Some(HealItemStatus::Failed),
            b'3' => Some(HealItemStatus::MissingParts),
            b'4' => Some(HealItemStatus::CannotBeHealed),
            _ => None,
        }
    }

    /// Terminal items are never offered again.
    pub fn is_terminal(self) -> bool {
        matches!(self, HealItemStatus::Ok | HealItemStatus::CannotBeHealed)
    }

    pub fn needs_processing(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_label(self) -> &'static str {
        match self {
            HealItemStatus::Wait => "wait",
            HealItemStatus::Ok => "ok",
            HealItemStatus::Failed => "failed",
            HealItemStatus::MissingParts => "missing_parts",
            HealItemStatus::CannotBeHealed => "cannot_be_healed",
        }
    }
}

impl fmt::Display for HealItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Raw status byte check used by the scanner. Unknown codes are re-offered.
pub fn byte_needs_processing(byte: u8) -> bool {
    HealItemStatus::decode(byte).map_or(true, HealItemStatus::needs_processing)
}

/// Count of each status code in a job's status record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub counts: BTreeMap<HealItemStatus, u64>,
    /// Bytes outside the encoding table, by raw value
    pub unknown: BTreeMap<u8, u64>,
}

impl StatusTally {
    pub fn record_byte(&mut self, byte: u8) {
        match HealItemStatus::decode(byte) {
            Some(status) => *self.counts.entry(status).or_default() += 1,
            None => *self.unknown.entry(byte).or_default() += 1,
        }
    }

    pub fn count(&self, status: HealItemStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum::<u64>() + self.unknown.values().sum::<u64>()
    }

    /// Items the next run would still offer to a healer.
    pub fn pending(&self) -> u64 {
        let known: u64 = self
            .counts
            .iter()
            .filter(|(status, _)| status.needs_processing())
            .map(|(_, n)| n)
            .sum();
        known + self.unknown.values().sum::<u64>()
    }

    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    /// One human-readable line per non-zero code.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(status, n)| match status {
                HealItemStatus::Wait => format!("{n} waiting to be healed"),
                HealItemStatus::Ok => format!("{n} healed"),
                HealItemStatus::Failed => format!("{n} failed to heal"),
                HealItemStatus::MissingParts => format!("{n} still missing parts"),
                HealItemStatus::CannotBeHealed => format!("{n} cannot be healed"),
            })
            .collect();
        lines.extend(
            self.unknown
                .iter()
                .map(|(byte, n)| format!("{n} with unknown status {byte:#04x}")),
        );
        lines
    }
}

impl fmt::Display for StatusTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Settings for healing an object list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealJobConfig {
    /// Root under which `heal/object-list/<list name>` job directories live
    pub work_dir: PathBuf,

    /// Heal calls per second allowed against each server
    pub qps: u32,

    /// Refresh period of the in-place progress view
    pub progress_interval: Duration,

    /// Emit one JSON record per result instead of the in-place view
    pub json: bool,
}

impl Default for HealJobConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            qps: 1,
            progress_interval: Duration::from_secs(1),
            json: false,
        }
    }
}

impl HealJobConfig {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_qps(mut self, qps: u32) -> Self {
        self.qps = qps;
        self
    }
}

/// `~/.mc`, or `.mc` under the current directory when no home is known.
pub fn default_work_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".mc"))
        .unwrap_or_else(|| PathBuf::from(".mc"))
}
