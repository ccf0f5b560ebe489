use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit: io error: {0}")]
    Io(String),

    #[error("audit: malformed record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        AuditError::Io(e.to_string())
    }
}

impl From<csv::Error> for AuditError {
    fn from(e: csv::Error) -> Self {
        AuditError::Io(e.to_string())
    }
}
