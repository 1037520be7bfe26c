//! File-backed log
//!
//! A single append-only file of framed [`LogRecord`]s. On open, the file is
//! scanned once: the last complete record fixes the next index and a torn
//! tail left by a crash is truncated away.
//!
//! A record is only torn if it is the last thing in the file. An incomplete
//! record followed by a complete one means its length prefix is damaged,
//! which is reported as corruption and never truncated.
//!
//! Readers created with [`FileLog::reader_from`] follow the file as it grows.
//! A partial final record is treated as "no more data yet".

use crate::log::{LogAppend, LogError, LogStream, Sequencer};
use crate::record::{LogRecord, LogRecordError};
use kglog_core::LogIndex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append handle for a log file
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: File,
    last_index: Option<LogIndex>,
    sync_on_append: bool,
}

impl FileLog {
    /// Open or create the log at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let scan = scan_records(&buffer)?;

        if scan.valid_end < buffer.len() {
            warn!(
                path = %path.display(),
                valid_end = scan.valid_end,
                file_len = buffer.len(),
                "Truncating torn tail of log file"
            );
            file.set_len(scan.valid_end as u64)?;
        }

        Ok(FileLog {
            path,
            file,
            last_index: scan.last_index,
            sync_on_append: false,
        })
    }

    /// fsync after every append
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream records with index `>= from`
    pub fn reader_from(&self, from: LogIndex) -> Result<FileLogReader, LogError> {
        FileLogReader::open(&self.path, from)
    }

    /// Flush appended records to disk
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl LogAppend for FileLog {
    fn append_record(&mut self, record: LogRecord) -> Result<(), LogError> {
        self.file.write_all(&record.to_bytes())?;
        if self.sync_on_append {
            self.file.sync_all()?;
        }
        self.last_index = Some(record.index);
        Ok(())
    }

    fn last_index(&self) -> Option<LogIndex> {
        self.last_index
    }
}

/// Reader over a log file
#[derive(Debug)]
pub struct FileLogReader {
    file: File,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already consumed
    consumed: usize,
    /// File offset of `buffer[0]`
    base_offset: u64,
    sequencer: Sequencer,
}

impl FileLogReader {
    /// Open a reader directly on a file path
    pub fn open(path: impl AsRef<Path>, from: LogIndex) -> Result<Self, LogError> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        Ok(FileLogReader {
            file,
            buffer: Vec::new(),
            consumed: 0,
            base_offset: 0,
            sequencer: Sequencer::starting_at(from),
        })
    }

    fn refill(&mut self) -> Result<(), LogError> {
        if self.consumed > 0 {
            self.buffer.drain(..self.consumed);
            self.base_offset += self.consumed as u64;
            self.consumed = 0;
        }
        self.file.read_to_end(&mut self.buffer)?;
        Ok(())
    }

    fn parse_next(&mut self) -> Result<Option<LogRecord>, LogError> {
        let remaining = &self.buffer[self.consumed..];
        if remaining.is_empty() {
            return Ok(None);
        }
        match LogRecord::from_bytes(remaining) {
            Ok((record, len)) => {
                self.consumed += len;
                Ok(Some(record))
            }
            Err(LogRecordError::InsufficientData) if is_torn_tail(remaining) => Ok(None),
            Err(source) => Err(LogError::Corrupt {
                offset: self.base_offset + self.consumed as u64,
                source,
            }),
        }
    }
}

impl LogStream for FileLogReader {
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogError> {
        loop {
            let record = match self.parse_next()? {
                Some(record) => record,
                None => {
                    self.refill()?;
                    match self.parse_next()? {
                        Some(record) => record,
                        None => return Ok(None),
                    }
                }
            };
            if self.sequencer.admit(record.index)? {
                return Ok(Some(record));
            }
        }
    }
}

struct ScanResult {
    valid_end: usize,
    last_index: Option<LogIndex>,
}

fn scan_records(buffer: &[u8]) -> Result<ScanResult, LogError> {
    let mut offset = 0;
    let mut last_index = None;
    while offset < buffer.len() {
        match LogRecord::from_bytes(&buffer[offset..]) {
            Ok((record, len)) => {
                last_index = Some(record.index);
                offset += len;
            }
            Err(LogRecordError::InsufficientData) if is_torn_tail(&buffer[offset..]) => break,
            Err(source) => {
                return Err(LogError::Corrupt {
                    offset: offset as u64,
                    source,
                })
            }
        }
    }
    Ok(ScanResult {
        valid_end: offset,
        last_index,
    })
}

/// Whether an incomplete record at the front of `bytes` is a torn tail.
///
/// A writer appends whole records in order, so nothing complete can follow
/// a torn one.
fn is_torn_tail(bytes: &[u8]) -> bool {
    (1..bytes.len()).all(|start| LogRecord::from_bytes(&bytes[start..]).is_err())
}
