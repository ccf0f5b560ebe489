//! Append-only audit log of check-in attempts.
//!
//! One [`LogRecord`] is written per attempt, whatever the outcome. Records
//! are never rewritten or deleted.

mod csv_log;
mod error;
mod memory;
mod record;

pub use csv_log::{CsvLog, HEADER};
pub use error::AuditError;
pub use memory::MemoryLog;
pub use record::{LogRecord, Status, TIMESTAMP_FORMAT, UNKNOWN};

/// Append-only record sink.
///
/// Implementations must be safe for concurrent use and must report every
/// failed write; a record is never dropped silently.
pub trait AuditLog: Send + Sync {
    /// Appends one record.
    fn append(&self, record: &LogRecord) -> Result<(), AuditError>;

    /// Returns all records in append order.
    fn records(&self) -> Result<Vec<LogRecord>, AuditError>;
}
