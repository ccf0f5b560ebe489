use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: no face detected")]
    NoFace,

    #[error("embed: API error: {0}")]
    Api(String),

    #[error("embed: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl EmbedError {
    /// True when the image was processed but contained no usable face.
    pub fn is_no_face(&self) -> bool {
        matches!(self, EmbedError::NoFace)
    }
}
