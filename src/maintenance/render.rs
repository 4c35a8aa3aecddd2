//! Plain-text table for the live maintenance view
//!
//! `10.3.18.189:9000  running  12/16  /data1/foo11(dumping)  3s`

use crate::maintenance::types::MaintenanceSnapshot;
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::time::Duration;

const HEADER: [&str; 6] = ["ELAPSED", "ENDPOINT", "STATUS", "VOLUMES", "CURRENT", "MESSAGE"];

/// Render one row per snapshot, header first. Every entry is one screen line.
pub fn render_table(snapshots: &[&MaintenanceSnapshot], now: DateTime<Utc>) -> Vec<String> {
    let mut rows: Vec<[String; 6]> = Vec::with_capacity(snapshots.len() + 1);
    rows.push(HEADER.map(str::to_string));

    for snap in snapshots {
        let current = if snap.current_volume.is_empty() {
            String::new()
        } else {
            format!("{}({})", snap.current_volume, snap.current_detail)
        };

        let mut message = snap.message.clone();
        let age = snap.age(now);
        if age > Duration::from_secs(1) {
            message.push_str(&format!("(updated {} ago)", format_duration(age)));
        }

        rows.push([
            format_duration(snap.elapsed),
            snap.endpoint.clone(),
            snap.status.to_string(),
            format!("{}/{}", snap.completed_volumes, snap.total_volumes),
            current,
            message,
        ]);
    }

    let mut widths = [0usize; 6];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            let line = row
                .iter()
                .zip(widths.iter())
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ");
            line.trim_end().to_string()
        })
        .collect()
}

/// Move the cursor up over `lines` previously written lines and clear them.
pub fn rewind_lines<W: Write>(out: &mut W, lines: usize) -> io::Result<()> {
    if lines == 0 {
        return Ok(());
    }
    write!(out, "\x1b[{lines}A\x1b[J")
}

/// Duration truncated to whole seconds, in humantime form: `2m 5s`, `1h`.
pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}
