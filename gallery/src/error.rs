use thiserror::Error;

/// Errors returned by gallery operations.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery: invalid input: {0}")]
    InvalidInput(String),

    #[error("gallery: image not found: {0}")]
    NotFound(String),

    #[error("gallery: io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GalleryError {
    fn from(e: std::io::Error) -> Self {
        GalleryError::Io(e.to_string())
    }
}
