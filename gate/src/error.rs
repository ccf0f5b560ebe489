use std::time::Duration;

use facegate_audit::AuditError;
use facegate_embed::EmbedError;
use facegate_embedcache::CacheError;
use facegate_gallery::GalleryError;
use facegate_matcher::MatchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("gate: invalid input: {0}")]
    InvalidInput(String),

    #[error("gate: embedder failure: {0}")]
    Embedder(#[from] EmbedError),

    #[error("gate: timed out after {0:?}")]
    Timeout(Duration),

    #[error("gate: gallery error: {0}")]
    Gallery(GalleryError),

    #[error("gate: cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("gate: audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("gate: matcher error: {0}")]
    Matcher(#[from] MatchError),
}

impl From<GalleryError> for GateError {
    fn from(e: GalleryError) -> Self {
        match e {
            GalleryError::InvalidInput(m) => GateError::InvalidInput(m),
            other => GateError::Gallery(other),
        }
    }
}

impl GateError {
    /// Process exit code for the command line.
    pub fn exit_code(&self) -> u8 {
        match self {
            GateError::InvalidInput(_) | GateError::Matcher(_) => 2,
            GateError::Embedder(_) => 4,
            GateError::Timeout(_) => 5,
            GateError::Gallery(_) | GateError::Cache(_) | GateError::Audit(_) => 6,
        }
    }
}
