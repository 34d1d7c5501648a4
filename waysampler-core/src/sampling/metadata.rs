//! Append-only sample log.
//!
//! The file is a single JSON document written incrementally, one record
//! per line:
//!
//! ```text
//! {"Info":{...},"Samples":[
//! {...},
//! {...}
//! ]}
//! ```
//!
//! The header goes on the first line, each record on its own line with the
//! separating comma at the end of the previous record, and the closing
//! marker is written when the session ends. A log left open by an
//! interrupted session, or cut off in the middle of a record, is repaired on
//! open by truncating it back to its last complete record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use super::{Sample, jobs::BackgroundJob};
use crate::Error;

const HEADER_PREFIX: &str = "{\"Info\":";
const HEADER_SUFFIX: &str = ",\"Samples\":[";
const CLOSE_MARKER: &[u8] = b"]}";

type WriteJob = BackgroundJob<(File, io::Result<()>)>;

/// Outcome of [`repair`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Complete records kept
    pub records: usize,
    /// Whether the log carried its closing marker
    pub was_closed: bool,
    /// Bytes cut from the end of the file, closing marker included
    pub truncated_bytes: u64,
}

/// Parsed content of a sample log
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    pub info: JsonValue,
    pub samples: Vec<Sample>,
}

struct LogScan<'a> {
    info: JsonValue,
    records: Vec<&'a [u8]>,
    /// Length of the valid prefix, ending right after the last record
    valid_len: usize,
    closed: bool,
}

fn scan_log(content: &[u8]) -> Result<LogScan<'_>, Error> {
    let header_end = content
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(content.len());
    let header = std::str::from_utf8(&content[..header_end])
        .map_err(|_| Error::InvalidData("sample log header is not UTF-8".to_string()))?;
    let info_text = header
        .strip_prefix(HEADER_PREFIX)
        .and_then(|rest| rest.strip_suffix(HEADER_SUFFIX))
        .ok_or_else(|| Error::InvalidData("file is not a sample log".to_string()))?;
    let info = serde_json::from_str(info_text)?;

    let mut scan = LogScan {
        info,
        records: Vec::new(),
        valid_len: header_end,
        closed: false,
    };

    let mut line_start = header_end + 1;
    while line_start < content.len() {
        let line_end = content[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(content.len(), |offset| line_start + offset);
        let line = &content[line_start..line_end];
        let record = line.strip_suffix(b",").unwrap_or(line);

        if record == CLOSE_MARKER {
            scan.closed = true;
            break;
        }
        match serde_json::from_slice::<JsonValue>(record) {
            Ok(value) if value.is_object() => {
                scan.records.push(record);
                scan.valid_len = line_start + record.len();
            }
            _ => {
                debug!("Sample log is cut off at byte {line_start}");
                break;
            }
        }
        line_start = line_end + 1;
    }

    Ok(scan)
}

/// Truncates a sample log to its last complete record and strips the
/// closing marker, so that appending can continue.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written, or if its header
/// is not a sample log header.
pub fn repair(path: &Path) -> Result<RepairReport, Error> {
    let content = fs::read(path)?;
    let scan = scan_log(&content)?;
    let truncated_bytes = (content.len() - scan.valid_len) as u64;

    if truncated_bytes > 0 {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(scan.valid_len as u64)?;
        file.sync_all()?;
        if !scan.closed {
            warn!(
                "Removed {truncated_bytes} bytes of incomplete records from {}",
                path.display()
            );
        }
    }

    Ok(RepairReport {
        records: scan.records.len(),
        was_closed: scan.closed,
        truncated_bytes,
    })
}

/// Reads every complete record of a sample log, closed or not
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a sample log or a
/// record is not a valid [`Sample`].
pub fn read_log(path: &Path) -> Result<MetadataDocument, Error> {
    let content = fs::read(path)?;
    let scan = scan_log(&content)?;
    let samples = scan
        .records
        .iter()
        .map(|record| serde_json::from_slice::<Sample>(record))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MetadataDocument {
        info: scan.info,
        samples,
    })
}

/// Writer side of the sample log.
///
/// Records are queued by [`append`](Self::append) and written by a single
/// background job at a time; the job owns the file handle while it runs.
#[derive(Debug)]
pub struct MetadataLog {
    path: PathBuf,
    file: Option<File>,
    writer: Option<WriteJob>,
    pending: String,
    record_count: usize,
}

impl MetadataLog {
    /// Opens the log at `path`, writing the header if the file is new and
    /// repairing it otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, repaired or opened.
    pub fn open(path: &Path, info: &JsonValue) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let existing = match fs::metadata(path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let (file, record_count) = if existing {
            let report = repair(path)?;
            info!(
                "Resuming sample log {} with {} records",
                path.display(),
                report.records
            );
            (OpenOptions::new().append(true).open(path)?, report.records)
        } else {
            let mut file = File::create(path)?;
            let header = format!(
                "{HEADER_PREFIX}{}{HEADER_SUFFIX}",
                serde_json::to_string(info)?
            );
            file.write_all(header.as_bytes())?;
            file.flush()?;
            info!("Created sample log {}", path.display());
            (file, 0)
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            writer: None,
            pending: String::new(),
            record_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in the log, including queued ones
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_idle(&self) -> bool {
        self.writer.is_none() && self.pending.is_empty()
    }

    /// Queues a record and starts a write if none is in flight
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataWrite`] if the record cannot be serialized
    /// or the file handle was lost by a failed write.
    pub fn append(&mut self, sample: &Sample) -> Result<(), Error> {
        let record = serde_json::to_string(sample)
            .map_err(|e| Error::MetadataWrite(format!("cannot serialize sample: {e}")))?;
        self.pending
            .push_str(if self.record_count == 0 { "\n" } else { ",\n" });
        self.pending.push_str(&record);
        self.record_count += 1;
        self.dispatch()
    }

    /// Collects a finished write and dispatches queued records. Returns
    /// `true` once nothing is queued or in flight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataWrite`] if the last write failed.
    pub fn poll(&mut self) -> Result<bool, Error> {
        if let Some(writer) = self.writer.as_mut() {
            let Some(outcome) = writer.try_take() else {
                return Ok(false);
            };
            self.writer = None;
            self.finish_write(outcome)?;
        }
        self.dispatch()?;
        Ok(self.is_idle())
    }

    /// Blocks until every queued record is on disk
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataWrite`] if a write fails.
    pub fn flush(&mut self) -> Result<(), Error> {
        loop {
            if let Some(writer) = self.writer.take() {
                self.finish_write(writer.wait())?;
            }
            if self.pending.is_empty() {
                return Ok(());
            }
            self.dispatch()?;
        }
    }

    /// Flushes and writes the closing marker
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataWrite`] if a write fails.
    pub fn close(mut self) -> Result<(), Error> {
        self.flush()?;
        let mut file = self.take_file()?;
        file.write_all(b"\n")
            .and_then(|()| file.write_all(CLOSE_MARKER))
            .and_then(|()| file.sync_all())
            .map_err(|e| self.write_error(&e))?;
        info!(
            "Closed sample log {} with {} records",
            self.path.display(),
            self.record_count
        );
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), Error> {
        if self.writer.is_some() || self.pending.is_empty() {
            return Ok(());
        }
        let mut file = self.take_file()?;
        let batch = std::mem::take(&mut self.pending);
        self.writer = Some(BackgroundJob::spawn(move || {
            let result = file
                .write_all(batch.as_bytes())
                .and_then(|()| file.flush());
            (file, result)
        }));
        Ok(())
    }

    fn finish_write(
        &mut self,
        outcome: Result<(File, io::Result<()>), Error>,
    ) -> Result<(), Error> {
        let (file, result) = outcome.map_err(|e| Error::MetadataWrite(e.to_string()))?;
        self.file = Some(file);
        result.map_err(|e| self.write_error(&e))
    }

    fn take_file(&mut self) -> Result<File, Error> {
        self.file.take().ok_or_else(|| {
            Error::MetadataWrite(format!(
                "{} is no longer writable after a failed write",
                self.path.display()
            ))
        })
    }

    fn write_error(&self, e: &io::Error) -> Error {
        Error::MetadataWrite(format!("{}: {e}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample(name: &str) -> Sample {
        Sample {
            image_path: Some(format!("./Images/{name}.jpg")),
            heading_angle: 90.0,
            lon: 13.4,
            lat: 52.5,
            altitude: 30.0,
            street_name: name.to_string(),
            ..Sample::default()
        }
    }

    #[test]
    fn test_closed_log_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");

        let mut log = MetadataLog::open(&path, &json!({"SampleDistance": 800.0})).unwrap();
        log.append(&sample("a")).unwrap();
        log.append(&sample("b")).unwrap();
        log.close().unwrap();

        let value: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["Info"]["SampleDistance"], 800.0);
        assert_eq!(value["Samples"].as_array().unwrap().len(), 2);
        assert_eq!(value["Samples"][1]["StreetName"], "b");
    }

    #[test]
    fn test_empty_closed_log_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");
        MetadataLog::open(&path, &json!({})).unwrap().close().unwrap();

        let value: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["Samples"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_appends_after_closing_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");

        let mut log = MetadataLog::open(&path, &json!({"Run": 1})).unwrap();
        log.append(&sample("a")).unwrap();
        log.close().unwrap();

        let mut log = MetadataLog::open(&path, &json!({"Run": 2})).unwrap();
        assert_eq!(log.record_count(), 1);
        log.append(&sample("b")).unwrap();
        log.close().unwrap();

        let document = read_log(&path).unwrap();
        // The header of the first run is kept
        assert_eq!(document.info["Run"], 1);
        let names = document
            .samples
            .iter()
            .map(|s| s.street_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
        serde_json::from_str::<JsonValue>(&fs::read_to_string(&path).unwrap()).unwrap();
    }

    #[test]
    fn test_repair_truncates_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");

        let mut log = MetadataLog::open(&path, &json!({})).unwrap();
        log.append(&sample("a")).unwrap();
        log.append(&sample("b")).unwrap();
        log.flush().unwrap();
        drop(log);

        // Simulate a crash in the middle of the third record
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b",\n{\"ImagePath\":\"./Ima").unwrap();
        drop(file);

        let report = repair(&path).unwrap();
        assert_eq!(report.records, 2);
        assert!(!report.was_closed);
        assert!(report.truncated_bytes > 0);

        let mut log = MetadataLog::open(&path, &json!({})).unwrap();
        log.append(&sample("c")).unwrap();
        log.close().unwrap();

        let document = read_log(&path).unwrap();
        assert_eq!(document.samples.len(), 3);
        assert_eq!(document.samples[2].street_name, "c");
    }

    #[test]
    fn test_poll_reports_idle_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");

        let mut log = MetadataLog::open(&path, &json!({})).unwrap();
        assert!(log.poll().unwrap());
        log.append(&sample("a")).unwrap();

        let mut idle = false;
        for _ in 0..1000 {
            if log.poll().unwrap() {
                idle = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(idle);
        assert_eq!(read_log(&path).unwrap().samples.len(), 1);
    }

    #[test]
    fn test_foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Samples.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(MetadataLog::open(&path, &json!({})).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1, 2, 3]");
    }
}
