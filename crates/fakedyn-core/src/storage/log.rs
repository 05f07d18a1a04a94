use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{LogConfig, SyncMode};
use crate::database::Operation;
use crate::error::StorageError;

use super::lock::LogLock;

/// One decoded log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub operation: Operation,
    pub payload: Value,
}

/// Append-only journal of mutating operations.
///
/// Each record is `<OperationName>\n<len>\n<payload>\n`, where `len` counts
/// the JSON payload bytes plus the trailing newline.
#[derive(Debug)]
pub struct PersistenceLog {
    path: PathBuf,
    file: File,
    size: u64,
    compaction_threshold: u64,
    sync: SyncMode,
    _lock: LogLock,
}

impl PersistenceLog {
    /// Open (or create) the log at `path` and take its advisory lock.
    pub fn open(path: &Path, config: &LogConfig) -> Result<Self, StorageError> {
        let lock = LogLock::acquire(path)?;
        let file = open_append(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            compaction_threshold: config.compaction_threshold,
            sync: config.sync,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read every complete record from the start of the log.
    ///
    /// An incomplete final record is a torn write: it is dropped and the
    /// file truncated to the last complete record. A malformed record
    /// anywhere else is an error.
    pub fn replay(&mut self) -> Result<Vec<LogRecord>, StorageError> {
        let data = fs::read(&self.path)?;
        let mut records = Vec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            match decode_record(&data, offset)? {
                Some((record, next)) => {
                    records.push(record);
                    offset = next;
                }
                None => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        dropped = data.len() - offset,
                        "truncating incomplete log record"
                    );
                    self.file.set_len(offset as u64)?;
                    self.file.sync_all()?;
                    break;
                }
            }
        }

        self.size = offset as u64;
        info!(path = %self.path.display(), records = records.len(), "log replayed");
        Ok(records)
    }

    /// Append one record.
    ///
    /// A failed append truncates the file back to its previous size, so a
    /// partial record never sits in front of later ones.
    pub fn append(&mut self, operation: Operation, payload: &Value) -> Result<(), StorageError> {
        let record = encode_record(operation, payload);
        if let Err(e) = self.write_record(&record) {
            self.discard_tail();
            return Err(e.into());
        }
        self.size += record.len() as u64;
        debug!(operation = %operation, bytes = record.len(), "log record appended");
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.file.write_all(record)?;
        if self.sync == SyncMode::Full {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cut the file back to the last complete record. Goes through the path
    /// because the append handle is the one that just failed.
    fn discard_tail(&self) {
        let truncated = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_len(self.size));
        if let Err(e) = truncated {
            warn!(
                path = %self.path.display(),
                size = self.size,
                error = %e,
                "could not truncate failed log append"
            );
        }
    }

    /// Whether the log has grown past its compaction threshold.
    pub fn needs_compaction(&self) -> bool {
        self.size > self.compaction_threshold
    }

    /// Replace the log with `records`, normally the database's snapshot.
    ///
    /// The new log is written beside the old one as `<log>.compact`, synced,
    /// then renamed over it, so a crash leaves one complete log or the other.
    pub fn compact(&mut self, records: &[(Operation, Value)]) -> Result<(), StorageError> {
        let compact_path = compact_path(&self.path);
        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&compact_path)?;

        let mut bytes = 0u64;
        for (operation, payload) in records {
            let record = encode_record(*operation, payload);
            out.write_all(&record)?;
            bytes += record.len() as u64;
        }
        out.sync_all()?;
        drop(out);

        // The handle follows the file through the rename.
        let file = open_append(&compact_path)?;
        let before = self.size;
        fs::rename(&compact_path, &self.path)?;
        self.file = file;
        self.size = bytes;

        info!(
            path = %self.path.display(),
            records = records.len(),
            before,
            bytes,
            "log compacted"
        );
        Ok(())
    }

    /// Discard every record.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.size = 0;
        Ok(())
    }

    /// Flush appended records to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Swap the append handle for a read-only one so the next append fails.
    #[cfg(test)]
    pub(crate) fn break_append_handle(&mut self) {
        self.file = File::open(&self.path).unwrap();
    }
}

fn open_append(path: &Path) -> Result<File, StorageError> {
    Ok(OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?)
}

fn compact_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".compact");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Record codec
// ---------------------------------------------------------------------------

fn encode_record(operation: Operation, payload: &Value) -> Vec<u8> {
    let body = payload.to_string();
    format!("{}\n{}\n{}\n", operation.as_str(), body.len() + 1, body).into_bytes()
}

/// Decode the record starting at `offset`. Returns `None` when the data ends
/// before the record does.
fn decode_record(data: &[u8], offset: usize) -> Result<Option<(LogRecord, usize)>, StorageError> {
    let corrupt = |reason: String| StorageError::CorruptRecord {
        offset: offset as u64,
        reason,
    };

    let Some((name, pos)) = read_line(data, offset) else {
        return Ok(None);
    };
    let Some((len, pos)) = read_line(data, pos) else {
        return Ok(None);
    };

    let name = std::str::from_utf8(name).map_err(|e| corrupt(e.to_string()))?;
    let operation: Operation = name
        .parse()
        .map_err(|_| corrupt(format!("unknown operation {name:?}")))?;
    let len: usize = std::str::from_utf8(len)
        .ok()
        .and_then(|len| len.parse().ok())
        .ok_or_else(|| corrupt("invalid record length".to_string()))?;
    if len == 0 {
        return Err(corrupt("empty record payload".to_string()));
    }

    let end = pos
        .checked_add(len)
        .ok_or_else(|| corrupt("record length overflows".to_string()))?;
    if end > data.len() {
        return Ok(None);
    }
    if data[end - 1] != b'\n' {
        return Err(corrupt("record payload is not newline-terminated".to_string()));
    }
    let payload: Value =
        serde_json::from_slice(&data[pos..end - 1]).map_err(|e| corrupt(e.to_string()))?;

    Ok(Some((LogRecord { operation, payload }, end)))
}

/// The bytes up to the next newline, and the offset just past it.
fn read_line(data: &[u8], offset: usize) -> Option<(&[u8], usize)> {
    let rest = data.get(offset..)?;
    let newline = rest.iter().position(|&b| b == b'\n')?;
    Some((&rest[..newline], offset + newline + 1))
}
