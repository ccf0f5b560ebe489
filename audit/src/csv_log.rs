use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{AuditError, AuditLog, LogRecord, Status, TIMESTAMP_FORMAT};

/// Header line of a log file.
pub const HEADER: &str = "Timestamp,Name,Status,Distance";

/// One CSV row. Field names double as the header.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Distance")]
    distance: String,
}

impl From<&LogRecord> for Row {
    fn from(r: &LogRecord) -> Self {
        Self {
            timestamp: r.timestamp_str(),
            name: r.name.clone(),
            status: r.status.label().to_string(),
            distance: r.distance_str(),
        }
    }
}

impl TryFrom<Row> for LogRecord {
    type Error = String;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| format!("timestamp {:?}: {e}", row.timestamp))?;
        let status: Status = row.status.parse()?;
        let distance = match row.distance.as_str() {
            "N/A" => None,
            "inf" => Some(f32::INFINITY),
            d => Some(d.parse::<f32>().map_err(|e| format!("distance {d:?}: {e}"))?),
        };
        Ok(LogRecord {
            timestamp,
            name: row.name,
            status,
            distance,
        })
    }
}

/// CSV file audit log.
///
/// The file and its header are created on first use. Appends from one
/// process are serialized and synced before returning.
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file for appending. The flag is set when it is still empty
    /// and needs a header.
    fn open_for_append(&self) -> Result<(File, bool), AuditError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let empty = f.metadata()?.len() == 0;
        if empty {
            tracing::debug!("audit: starting {}", self.path.display());
        }
        Ok((f, empty))
    }
}

impl AuditLog for CsvLog {
    fn append(&self, record: &LogRecord) -> Result<(), AuditError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (f, empty) = self.open_for_append()?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(f);
        wtr.serialize(Row::from(record))?;
        let f = wtr
            .into_inner()
            .map_err(|e| AuditError::Io(e.error().to_string()))?;
        f.sync_data()?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<LogRecord>, AuditError> {
        let f = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(f);
        let headers = rdr.headers()?.clone();

        let mut out = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let fallback = i + 2;
            let rec = result.map_err(|e| AuditError::Malformed {
                line: e.position().map_or(fallback, |p| p.line() as usize),
                reason: e.to_string(),
            })?;
            let line = rec.position().map_or(fallback, |p| p.line() as usize);
            let row: Row = rec
                .deserialize(Some(&headers))
                .map_err(|e| AuditError::Malformed {
                    line,
                    reason: e.to_string(),
                })?;
            out.push(
                LogRecord::try_from(row)
                    .map_err(|reason| AuditError::Malformed { line, reason })?,
            );
        }
        Ok(out)
    }
}
