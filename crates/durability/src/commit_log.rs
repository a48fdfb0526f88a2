//! Append-only commit log
//!
//! The commit log is the durable source of truth for an on-disk database.
//! Each committed transaction is appended as one self-checking frame (see
//! [`crate::encoding`]). On open, the log is replayed to rebuild memory.
//!
//! ## Recovery Rules
//!
//! - A partial frame at the end of the file is a torn write: the commit was
//!   never acknowledged, so it is discarded and the file is truncated to the
//!   last complete frame.
//! - A complete frame that fails its CRC or does not decode is corruption:
//!   opening fails rather than silently dropping acknowledged commits.
//! - A failed append leaves nothing behind: buffered bytes are dropped and
//!   the file is cut back to the end of the last acknowledged frame.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tally_core::{TallyError, TallyResult};
use tracing::{debug, info, warn};

use crate::encoding::{decode_record, encode_record, DecodeError};
use crate::mode::DurabilityMode;
use crate::record::CommitRecord;

/// Default commit log file name inside a data directory
pub const COMMIT_LOG_FILE_NAME: &str = "commits.log";

/// Result of reading a commit log from disk
#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    /// Complete records in log order
    pub records: Vec<CommitRecord>,
    /// Length of the valid prefix of the file
    pub valid_bytes: u64,
    /// Bytes of torn tail discarded after the valid prefix
    pub discarded_bytes: u64,
}

impl ReplayResult {
    /// Highest transaction id seen, 0 for an empty log
    pub fn max_txn_id(&self) -> u64 {
        self.records.iter().map(|r| r.txn_id).max().unwrap_or(0)
    }
}

/// Append-only commit log writer
#[derive(Debug)]
pub struct CommitLog {
    path: PathBuf,
    writer: BufWriter<File>,
    mode: DurabilityMode,
    commits_since_sync: usize,
    /// End of the last acknowledged frame
    len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(test)]
    fail_next: Option<FailPoint>,
}

/// Where an injected append failure fires
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailPoint {
    /// Before the frame reaches the file
    Flush,
    /// After the frame is flushed, in place of the fsync
    Sync,
}

impl CommitLog {
    /// Open (or create) the log at `path`, replaying its contents
    ///
    /// A torn tail is truncated away before the writer is positioned, so
    /// new frames always follow the last complete one.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` for an invalid complete frame and `Io` for file errors.
    pub fn open(path: impl AsRef<Path>, mode: DurabilityMode) -> TallyResult<(Self, ReplayResult)> {
        let path = path.as_ref().to_path_buf();
        let replay = Self::read(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if replay.discarded_bytes > 0 {
            warn!(
                target: "tally::durability",
                path = %path.display(),
                discarded_bytes = replay.discarded_bytes,
                "Discarding torn commit log tail"
            );
            file.set_len(replay.valid_bytes)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().append(true).open(&path)?;

        info!(
            target: "tally::durability",
            path = %path.display(),
            records = replay.records.len(),
            "Commit log opened"
        );

        Ok((
            CommitLog {
                path,
                writer: BufWriter::new(file),
                mode,
                commits_since_sync: 0,
                len: replay.valid_bytes,
                poisoned: false,
                #[cfg(test)]
                fail_next: None,
            },
            replay,
        ))
    }

    /// Read every complete record of the log at `path`
    ///
    /// A missing file reads as an empty log.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` for an invalid complete frame and `Io` for file errors.
    pub fn read(path: impl AsRef<Path>) -> TallyResult<ReplayResult> {
        let path = path.as_ref();
        let mut buf = Vec::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_end(&mut buf)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayResult::default());
            }
            Err(e) => return Err(e.into()),
        }

        let mut result = ReplayResult::default();
        let mut offset = 0usize;
        while offset < buf.len() {
            match decode_record(&buf[offset..], offset as u64) {
                Ok((record, consumed)) => {
                    result.records.push(record);
                    offset += consumed;
                }
                Err(DecodeError::Incomplete { .. }) => break,
                Err(e @ DecodeError::Corrupt { .. }) => {
                    return Err(TallyError::corruption(format!(
                        "commit log {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        result.valid_bytes = offset as u64;
        result.discarded_bytes = (buf.len() - offset) as u64;
        Ok(result)
    }

    /// Append one commit record
    ///
    /// The record is flushed to the OS before this returns, and fsynced when
    /// the durability mode says so. A commit must not be acknowledged unless
    /// this returned `Ok`. On error the log is exactly as it was before the
    /// call, so the same version can be appended again.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the record cannot be encoded, `Io` if the
    /// write, flush, or fsync fails, and `Storage` if an earlier failure
    /// could not be rolled back.
    pub fn append(&mut self, record: &CommitRecord) -> TallyResult<()> {
        if self.poisoned {
            return Err(TallyError::storage(format!(
                "commit log {} is unusable after a failed rollback",
                self.path.display()
            )));
        }
        let frame = encode_record(record).map_err(TallyError::serialization)?;

        if let Err(e) = self.write_frame(&frame) {
            warn!(
                target: "tally::durability",
                txn_id = record.txn_id,
                version = record.version.as_u64(),
                error = %e,
                "Commit record append failed, rolling back"
            );
            self.rollback()?;
            return Err(e);
        }
        self.len += frame.len() as u64;

        debug!(
            target: "tally::durability",
            txn_id = record.txn_id,
            version = record.version.as_u64(),
            bytes = frame.len(),
            "Commit record appended"
        );
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> TallyResult<()> {
        self.writer.write_all(frame)?;
        #[cfg(test)]
        self.inject(FailPoint::Flush)?;
        self.writer.flush()?;

        self.commits_since_sync += 1;
        if self.mode.should_sync(self.commits_since_sync) {
            #[cfg(test)]
            self.inject(FailPoint::Sync)?;
            self.sync()?;
        }
        Ok(())
    }

    /// Drop unflushed bytes and cut the file back to the last good frame
    fn rollback(&mut self) -> TallyResult<()> {
        let result = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|file| {
                // into_parts hands back the buffer instead of flushing it
                let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
                drop(stale.into_parts());
                self.writer.get_ref().set_len(self.len)?;
                self.writer.get_ref().sync_data()
            });

        if let Err(e) = result {
            self.poisoned = true;
            return Err(TallyError::storage(format!(
                "commit log {}: rollback to {} bytes failed: {}",
                self.path.display(),
                self.len,
                e
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    fn inject(&mut self, point: FailPoint) -> TallyResult<()> {
        if self.fail_next == Some(point) {
            self.fail_next = None;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected failure").into());
        }
        Ok(())
    }

    /// Flush and fsync everything appended so far
    ///
    /// # Errors
    ///
    /// Returns `Io` if the flush or fsync fails.
    pub fn sync(&mut self) -> TallyResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.commits_since_sync = 0;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability mode this log was opened with
    pub fn mode(&self) -> DurabilityMode {
        self.mode
    }
}
