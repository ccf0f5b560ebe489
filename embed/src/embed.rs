use crate::config::ModelConfig;
use crate::error::EmbedError;

/// Embedder converts one face image into a dense f32 vector.
///
/// Output must be deterministic for a given image and [`ModelConfig`]:
/// the embedding cache reuses vectors on that assumption.
///
/// Implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Return the embedding vector for one encoded image (JPEG/PNG bytes).
    ///
    /// Returns [`EmbedError::NoFace`] when the model finds no face.
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    /// Return the model identity and output dimensionality.
    fn model(&self) -> &ModelConfig;
}
