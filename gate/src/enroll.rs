use facegate_embedcache::EmbeddingCache;
use facegate_gallery::{GalleryImage, GalleryStore, validate_identity};
use tracing::info;

use crate::GateError;

/// Result of a successful enrollment.
#[derive(Debug, Clone)]
pub struct Enrolled {
    pub identity: String,
    /// Stored images, in input order.
    pub images: Vec<GalleryImage>,
}

/// Adds images for `identity` and invalidates the cache.
///
/// Input is validated before anything is written. Once the gallery has been
/// touched the cache is invalidated whether or not the write succeeded, so a
/// partial write is never served from a stale cache.
pub fn enroll(
    gallery: &dyn GalleryStore,
    cache: &EmbeddingCache,
    identity: &str,
    images: &[Vec<u8>],
) -> Result<Enrolled, GateError> {
    validate_identity(identity)?;
    if images.is_empty() {
        return Err(GateError::InvalidInput("no images given".into()));
    }
    if let Some(i) = images.iter().position(|b| b.is_empty()) {
        return Err(GateError::InvalidInput(format!("image {} is empty", i + 1)));
    }

    let result = gallery.add_images(identity, images);
    cache.invalidate();

    let images = result?;
    info!(
        "gate: enrolled {} image(s) for {identity}, cache cleared",
        images.len()
    );
    Ok(Enrolled {
        identity: identity.to_string(),
        images,
    })
}
