use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::store::validate_add;
use crate::{GalleryError, GalleryImage, GalleryStore, fingerprint, image_name};

/// In-memory [`GalleryStore`] implementation.
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

struct MemoryStoreInner {
    // identity -> name -> bytes
    data: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    seq: u128,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner {
                data: BTreeMap::new(),
                seq: 0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>, GalleryError> {
        self.inner
            .lock()
            .map_err(|e| GalleryError::Io(format!("lock poisoned: {e}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GalleryStore for MemoryStore {
    fn identities(&self) -> Result<BTreeSet<String>, GalleryError> {
        Ok(self.lock()?.data.keys().cloned().collect())
    }

    fn images(&self, identity: &str) -> Result<Vec<GalleryImage>, GalleryError> {
        let inner = self.lock()?;
        let Some(images) = inner.data.get(identity) else {
            return Ok(Vec::new());
        };
        Ok(images
            .iter()
            .map(|(name, bytes)| GalleryImage {
                identity: identity.to_string(),
                name: name.clone(),
                fingerprint: fingerprint(bytes),
            })
            .collect())
    }

    fn read(&self, image: &GalleryImage) -> Result<Vec<u8>, GalleryError> {
        let inner = self.lock()?;
        inner
            .data
            .get(&image.identity)
            .and_then(|m| m.get(&image.name))
            .cloned()
            .ok_or_else(|| GalleryError::NotFound(format!("{}/{}", image.identity, image.name)))
    }

    fn add_images(
        &self,
        identity: &str,
        images: &[Vec<u8>],
    ) -> Result<Vec<GalleryImage>, GalleryError> {
        validate_add(identity, images)?;

        let mut inner = self.lock()?;
        inner.seq += 1;
        // The sequence stands in for the wall clock so names never collide.
        let stamp = inner.seq;
        let entry = inner.data.entry(identity.to_string()).or_default();

        let mut stored = Vec::with_capacity(images.len());
        for (i, bytes) in images.iter().enumerate() {
            let name = image_name(identity, stamp, i + 1, bytes);
            entry.insert(name.clone(), bytes.clone());
            stored.push(GalleryImage {
                identity: identity.to_string(),
                name,
                fingerprint: fingerprint(bytes),
            });
        }
        Ok(stored)
    }

    fn remove_image(&self, image: &GalleryImage) -> Result<(), GalleryError> {
        let mut inner = self.lock()?;
        let Some(images) = inner.data.get_mut(&image.identity) else {
            return Err(GalleryError::NotFound(image.identity.clone()));
        };
        if images.remove(&image.name).is_none() {
            return Err(GalleryError::NotFound(format!(
                "{}/{}",
                image.identity, image.name
            )));
        }
        if images.is_empty() {
            inner.data.remove(&image.identity);
        }
        Ok(())
    }
}
