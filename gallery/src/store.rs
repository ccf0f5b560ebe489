use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Fingerprint, GalleryError};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One enrollment image, owned by exactly one identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GalleryImage {
    pub identity: String,
    /// Store-local name, unique within the identity (e.g. file name).
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// Persists identities and their enrollment images.
///
/// Implementations must be safe for concurrent use.
/// Use [`crate::MemoryStore`] for testing and [`crate::DirStore`] on disk.
pub trait GalleryStore: Send + Sync {
    /// Returns every enrolled identity.
    fn identities(&self) -> Result<BTreeSet<String>, GalleryError>;

    /// Returns the images of one identity, ordered by name.
    /// An unknown identity has no images.
    fn images(&self, identity: &str) -> Result<Vec<GalleryImage>, GalleryError>;

    /// Reads the raw bytes of an image.
    fn read(&self, image: &GalleryImage) -> Result<Vec<u8>, GalleryError>;

    /// Stores images under generated unique names, creating the identity if
    /// absent. Returns the stored images in input order.
    fn add_images(
        &self,
        identity: &str,
        images: &[Vec<u8>],
    ) -> Result<Vec<GalleryImage>, GalleryError>;

    /// Removes one image.
    fn remove_image(&self, image: &GalleryImage) -> Result<(), GalleryError>;

    /// Returns all images of all identities, ordered by (identity, name).
    fn snapshot(&self) -> Result<Vec<GalleryImage>, GalleryError> {
        let mut all = Vec::new();
        for identity in self.identities()? {
            all.extend(self.images(&identity)?);
        }
        Ok(all)
    }
}

/// Checks that an identity can name a gallery entry.
///
/// Identities are opaque, but they double as directory names, so empty
/// names, path separators and dot-prefixed names are refused.
pub fn validate_identity(identity: &str) -> Result<(), GalleryError> {
    if identity.trim().is_empty() {
        return Err(GalleryError::InvalidInput("identity is empty".into()));
    }
    if identity.starts_with('.')
        || identity.contains(['/', '\\'])
        || identity.chars().any(char::is_control)
    {
        return Err(GalleryError::InvalidInput(format!(
            "identity {identity:?} is not a valid name"
        )));
    }
    Ok(())
}

pub(crate) fn validate_add(identity: &str, images: &[Vec<u8>]) -> Result<(), GalleryError> {
    validate_identity(identity)?;
    if images.is_empty() {
        return Err(GalleryError::InvalidInput("no images supplied".into()));
    }
    if let Some(i) = images.iter().position(|img| img.is_empty()) {
        return Err(GalleryError::InvalidInput(format!("image {} is empty", i + 1)));
    }
    Ok(())
}

/// File extension for an image, chosen from its magic bytes.
pub fn image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PNG_MAGIC) {
        "png"
    } else {
        "jpg"
    }
}

/// Generated image name. Format: `{identity}_{unix_ms}_{seq}.{ext}`.
pub fn image_name(identity: &str, unix_ms: u128, seq: usize, bytes: &[u8]) -> String {
    format!("{identity}_{unix_ms}_{seq}.{}", image_extension(bytes))
}
