use std::fmt;

use facegate_embed::EmbedError;
use facegate_gallery::{Fingerprint, GalleryImage};
use serde::{Deserialize, Serialize};

/// One gallery image's embedding.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub identity: String,
    pub fingerprint: Fingerprint,
    pub vector: Vec<f32>,
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("identity", &self.identity)
            .field("fingerprint", &self.fingerprint.short())
            .field("vector_len", &self.vector.len())
            .finish()
    }
}

/// Why a gallery image has no cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The model found no face in the image.
    NoFace,
    /// The embedder rejected the image (bad dimension, empty input).
    Rejected(String),
    /// The embedder call failed; retried on the next rebuild.
    Embedder(String),
    /// The image could not be read from the gallery; retried on the next rebuild.
    Unreadable(String),
}

impl SkipReason {
    pub(crate) fn from_embed(err: &EmbedError) -> Self {
        match err {
            EmbedError::NoFace => SkipReason::NoFace,
            EmbedError::EmptyInput | EmbedError::DimensionMismatch { .. } => {
                SkipReason::Rejected(err.to_string())
            }
            EmbedError::Api(_) => SkipReason::Embedder(err.to_string()),
        }
    }

    /// Deterministic failures are remembered per fingerprint so the same
    /// bytes are not sent to the embedder again under the same model.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SkipReason::NoFace | SkipReason::Rejected(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoFace => write!(f, "no face detected"),
            SkipReason::Rejected(m) => write!(f, "rejected: {m}"),
            SkipReason::Embedder(m) => write!(f, "embedder failed: {m}"),
            SkipReason::Unreadable(m) => write!(f, "unreadable: {m}"),
        }
    }
}

/// A gallery image left out of the cache by a rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub image: GalleryImage,
    pub reason: SkipReason,
    /// True if the failure was remembered from an earlier rebuild and the
    /// embedder was not called this time.
    pub remembered: bool,
}

/// Outcome of one committed rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    /// Gallery images considered.
    pub images: usize,
    /// Entries in the committed cache.
    pub entries: usize,
    /// Embedder invocations.
    pub embedded: usize,
    /// Images served from previously cached vectors.
    pub reused: usize,
    /// Images without an entry.
    pub skipped: Vec<SkippedImage>,
    /// Passes needed before the gallery held still long enough to commit.
    pub attempts: usize,
}
