use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Name logged when no identity could be attached to an attempt.
pub const UNKNOWN: &str = "Unknown";

/// Outcome label of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    AccessGranted,
    AccessDenied,
    NoFaceDetected,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::AccessGranted => "Access Granted",
            Status::AccessDenied => "Access Denied",
            Status::NoFaceDetected => "No Face Detected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Access Granted" => Ok(Status::AccessGranted),
            "Access Denied" => Ok(Status::AccessDenied),
            "No Face Detected" => Ok(Status::NoFaceDetected),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

/// One check-in attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Local wall-clock time, second precision.
    pub timestamp: NaiveDateTime,
    /// Matched identity, or [`UNKNOWN`].
    pub name: String,
    pub status: Status,
    /// None is logged as "N/A".
    pub distance: Option<f32>,
}

impl LogRecord {
    /// Creates a record stamped with the current local time.
    pub fn now(identity: Option<&str>, status: Status, distance: Option<f32>) -> Self {
        let ts = Local::now().naive_local();
        Self {
            timestamp: ts.with_nanosecond(0).unwrap_or(ts),
            name: identity.unwrap_or(UNKNOWN).to_string(),
            status,
            distance,
        }
    }

    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Distance with four decimals, or "N/A".
    pub fn distance_str(&self) -> String {
        match self.distance {
            Some(d) if d.is_finite() => format!("{d:.4}"),
            Some(_) => "inf".to_string(),
            None => "N/A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for s in [Status::AccessGranted, Status::AccessDenied, Status::NoFaceDetected] {
            assert_eq!(s.label().parse::<Status>().unwrap(), s);
        }
        assert!("Maybe".parse::<Status>().is_err());
    }

    #[test]
    fn unknown_name_and_na_distance() {
        let r = LogRecord::now(None, Status::AccessDenied, None);
        assert_eq!(r.name, UNKNOWN);
        assert_eq!(r.distance_str(), "N/A");
        assert_eq!(r.timestamp.nanosecond(), 0);
    }

    #[test]
    fn distance_has_four_decimals() {
        let r = LogRecord::now(Some("Alice"), Status::AccessGranted, Some(0.123456));
        assert_eq!(r.distance_str(), "0.1235");
        assert_eq!(r.timestamp_str().len(), "2024-01-01 00:00:00".len());
    }
}
