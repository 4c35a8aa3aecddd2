//! On-disk heal job: a hard link to the object list plus one status byte per line

use crate::heal::error::{HealError, HealResult};
use crate::heal::scanner::HealScanner;
use crate::heal::types::{HealItemStatus, StatusTally};
use crate::prompt::Confirm;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const JOBS_DIR: &str = "heal/object-list";
pub const LIST_FILE: &str = "list";
pub const STATUS_FILE: &str = "status";

pub const RESUME_PROMPT: &str =
    "the object list existed, choose yes to resume, no to restart [Yes|No]";

const STATUS_CHUNK: usize = 64 * 1024;

/// An open heal job.
///
/// Line `i` of the list corresponds to byte `i` of the status record, and
/// the two always have the same length.
pub struct HealJobStore {
    dir: PathBuf,
    list: Arc<File>,
    status: Arc<File>,
    line_count: u64,
}

impl HealJobStore {
    /// Job directory for `list_file` under `work_dir`.
    pub fn job_dir(work_dir: &Path, list_file: &Path) -> HealResult<PathBuf> {
        let name = list_file
            .file_name()
            .ok_or_else(|| HealError::InvalidListPath(list_file.to_path_buf()))?;
        Ok(work_dir.join(JOBS_DIR).join(name))
    }

    /// Open the job for `list_file`, creating it or asking whether to resume.
    ///
    /// A new job validates every line first; a malformed list leaves nothing
    /// behind on disk. Declining to resume discards the old job and starts
    /// from scratch.
    pub fn open(work_dir: &Path, list_file: &Path, confirm: &dyn Confirm) -> HealResult<Self> {
        let dir = Self::job_dir(work_dir, list_file)?;

        let line_count = match fs::metadata(&dir) {
            Ok(_) => {
                if confirm.confirm(RESUME_PROMPT) {
                    info!(dir = %dir.display(), "Resuming heal job");
                    Self::check_existing(&dir)?
                } else {
                    let line_count = count_and_validate_lines(list_file)?;
                    info!(dir = %dir.display(), "Restarting heal job");
                    fs::remove_dir_all(&dir)?;
                    Self::create(&dir, list_file, line_count)?;
                    line_count
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let line_count = count_and_validate_lines(list_file)?;
                Self::create(&dir, list_file, line_count)?;
                line_count
            }
            Err(e) => return Err(e.into()),
        };

        let list = File::open(dir.join(LIST_FILE))?;
        let status = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join(STATUS_FILE))?;

        Ok(Self {
            dir,
            list: Arc::new(list),
            status: Arc::new(status),
            line_count,
        })
    }

    fn create(dir: &Path, list_file: &Path, line_count: u64) -> HealResult<()> {
        fs::create_dir_all(dir)?;
        if let Err(e) = Self::populate(dir, list_file, line_count) {
            if let Err(cleanup) = fs::remove_dir_all(dir) {
                warn!(dir = %dir.display(), "Failed to clean up partial heal job: {}", cleanup);
            }
            return Err(e.into());
        }
        info!(dir = %dir.display(), lines = line_count, "Created heal job");
        Ok(())
    }

    fn populate(dir: &Path, list_file: &Path, line_count: u64) -> io::Result<()> {
        fs::hard_link(list_file, dir.join(LIST_FILE))?;

        let mut status = File::create(dir.join(STATUS_FILE))?;
        let chunk = [HealItemStatus::Wait.encode(); STATUS_CHUNK];
        let mut remaining = line_count;
        while remaining > 0 {
            let n = remaining.min(STATUS_CHUNK as u64) as usize;
            status.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        status.sync_all()
    }

    fn check_existing(dir: &Path) -> HealResult<u64> {
        let lines = count_lines(&dir.join(LIST_FILE))?;
        let status = fs::metadata(dir.join(STATUS_FILE))?.len();
        if lines != status {
            return Err(HealError::StatusMismatch { status, lines });
        }
        Ok(lines)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list_path(&self) -> PathBuf {
        self.dir.join(LIST_FILE)
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Count every code currently in the status record.
    pub fn tally(&self) -> HealResult<StatusTally> {
        let mut tally = StatusTally::default();
        let mut buf = vec![0u8; STATUS_CHUNK];
        let mut offset = 0u64;
        loop {
            let n = pio::read_at(&self.status, &mut buf, offset)?;
            if n == 0 {
                break;
            }
            for byte in &buf[..n] {
                tally.record_byte(*byte);
            }
            offset += n as u64;
        }
        Ok(tally)
    }

    /// Raw status byte of `line`.
    pub fn read_status(&self, line: u64) -> io::Result<u8> {
        pio::read_byte_at(&self.status, line)
    }

    pub fn status_writer(&self, line: u64) -> StatusWriter {
        StatusWriter {
            file: Arc::clone(&self.status),
            offset: line,
        }
    }

    /// Forward-only scanner over the pending lines of this job.
    pub fn scanner(&self) -> HealScanner {
        HealScanner::new(Arc::clone(&self.list), Arc::clone(&self.status))
    }

    /// Flush the status record and release this store's handles.
    pub fn close(self) -> HealResult<()> {
        self.status.sync_data()?;
        debug!(dir = %self.dir.display(), "Closed heal job");
        Ok(())
    }

    /// Delete the job directory.
    pub fn remove(self) -> HealResult<()> {
        let dir = self.dir.clone();
        drop(self);
        fs::remove_dir_all(&dir)?;
        info!(dir = %dir.display(), "Removed heal job");
        Ok(())
    }
}

/// Writes the status byte of a single line.
#[derive(Clone)]
pub struct StatusWriter {
    file: Arc<File>,
    offset: u64,
}

impl StatusWriter {
    pub(crate) fn new(file: Arc<File>, offset: u64) -> Self {
        Self { file, offset }
    }

    pub fn line(&self) -> u64 {
        self.offset
    }

    pub fn persist_blocking(&self, status: HealItemStatus) -> io::Result<()> {
        pio::write_byte_at(&self.file, self.offset, status.encode())
    }

    pub async fn persist(&self, status: HealItemStatus) -> io::Result<()> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.persist_blocking(status))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Names of the heal jobs under `work_dir`, skipping hidden entries.
pub fn list_jobs(work_dir: &Path) -> HealResult<Vec<String>> {
    let entries = match fs::read_dir(work_dir.join(JOBS_DIR)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut jobs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        jobs.push(name);
    }
    jobs.sort();
    Ok(jobs)
}

/// Split a list line into `(bucket, key)`. A third field is allowed and ignored.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.split(',');
    let bucket = fields.next()?;
    let key = fields.next()?;
    let _status = fields.next();
    if fields.next().is_some() {
        return None;
    }
    Some((bucket, key))
}

/// Count the lines of `path`, failing on the first one that does not parse.
pub fn count_and_validate_lines(path: &Path) -> HealResult<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut count = 0u64;
    while read_line(&mut reader, &mut buf)? {
        let valid = std::str::from_utf8(&buf).ok().and_then(parse_line).is_some();
        if !valid {
            return Err(HealError::InvalidFormat {
                line: count + 1,
                content: String::from_utf8_lossy(&buf).into_owned(),
            });
        }
        count += 1;
    }
    Ok(count)
}

fn count_lines(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut count = 0u64;
    while read_line(&mut reader, &mut buf)? {
        count += 1;
    }
    Ok(count)
}

/// Read one line into `buf` without its terminator. Returns false at EOF.
pub(crate) fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Positional reads and writes that leave the file cursor alone.
pub(crate) mod pio {
    use std::fs::File;
    use std::io;

    #[cfg(unix)]
    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(unix)]
    pub fn write_byte_at(file: &File, offset: u64, byte: u8) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        file.write_all_at(&[byte], offset)
    }

    #[cfg(windows)]
    pub fn write_byte_at(file: &File, offset: u64, byte: u8) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        match file.seek_write(&[byte], offset)? {
            1 => Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::WriteZero, "status byte not written")),
        }
    }

    pub fn read_byte_at(file: &File, offset: u64) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        match read_at(file, &mut byte, offset)? {
            1 => Ok(byte[0]),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no status byte at offset {offset}"),
            )),
        }
    }
}
