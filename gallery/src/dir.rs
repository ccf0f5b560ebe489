use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::store::validate_add;
use crate::{GalleryError, GalleryImage, GalleryStore, fingerprint, image_name};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Directory-backed [`GalleryStore`].
///
/// Layout: `{root}/{identity}/{image}`. Only `.jpg`, `.jpeg` and `.png`
/// files count as images; hidden files (including in-flight temp files) are
/// ignored.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first enrollment.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn identity_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Writes `bytes` to a hidden temp file and renames it into place, so a
    /// concurrent listing never sees a partial image.
    ///
    /// Returns false if the name is taken, either by an image or by a temp
    /// file left behind by another writer.
    fn write_new(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<bool, GalleryError> {
        let target = dir.join(name);
        if target.exists() {
            return Ok(false);
        }
        let tmp = dir.join(format!(".{name}.tmp"));
        let mut f = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("gallery: {} in use, trying another name", tmp.display());
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        f.write_all(bytes)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, &target).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })?;
        Ok(true)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

impl GalleryStore for DirStore {
    fn identities(&self) -> Result<BTreeSet<String>, GalleryError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !is_hidden(name) {
                    ids.insert(name.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn images(&self, identity: &str) -> Result<Vec<GalleryImage>, GalleryError> {
        let entries = match fs::read_dir(self.identity_dir(identity)) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_hidden(&name) || !is_image(&path) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let bytes = fs::read(self.identity_dir(identity).join(&name))?;
            images.push(GalleryImage {
                identity: identity.to_string(),
                name,
                fingerprint: fingerprint(&bytes),
            });
        }
        Ok(images)
    }

    fn read(&self, image: &GalleryImage) -> Result<Vec<u8>, GalleryError> {
        let path = self.identity_dir(&image.identity).join(&image.name);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GalleryError::NotFound(path.display().to_string()),
            _ => e.into(),
        })
    }

    fn add_images(
        &self,
        identity: &str,
        images: &[Vec<u8>],
    ) -> Result<Vec<GalleryImage>, GalleryError> {
        validate_add(identity, images)?;

        let dir = self.identity_dir(identity);
        if !dir.exists() {
            debug!("gallery: creating identity directory {}", dir.display());
        }
        fs::create_dir_all(&dir)?;

        let stamp = unix_ms();
        let mut stored = Vec::with_capacity(images.len());
        for (i, bytes) in images.iter().enumerate() {
            let mut attempt = 0usize;
            let name = loop {
                let seq = i + 1 + attempt * images.len();
                let name = image_name(identity, stamp, seq, bytes);
                if self.write_new(&dir, &name, bytes)? {
                    break name;
                }
                attempt += 1;
            };
            debug!("gallery: stored {}/{}", identity, name);
            stored.push(GalleryImage {
                identity: identity.to_string(),
                name,
                fingerprint: fingerprint(bytes),
            });
        }
        Ok(stored)
    }

    fn remove_image(&self, image: &GalleryImage) -> Result<(), GalleryError> {
        let dir = self.identity_dir(&image.identity);
        let path = dir.join(&image.name);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GalleryError::NotFound(path.display().to_string()),
            _ => e.into(),
        })?;
        // Drop the identity once its last image is gone; fails harmlessly
        // if other files remain.
        let _ = fs::remove_dir(&dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0jpeg-body";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\npng-body";

    #[test]
    fn missing_root_is_empty_gallery() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path().join("nope"));
        assert!(store.identities().unwrap().is_empty());
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn add_writes_one_file_per_image() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());

        let added = store
            .add_images("Bob", &[JPEG.to_vec(), PNG.to_vec()])
            .unwrap();
        assert_eq!(added.len(), 2);
        assert!(added[0].name.starts_with("Bob_") && added[0].name.ends_with("_1.jpg"));
        assert!(added[1].name.ends_with("_2.png"));

        let listed = store.images("Bob").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(store.read(&added[1]).unwrap(), PNG.to_vec());
    }

    #[test]
    fn same_millisecond_enrollments_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());
        for _ in 0..3 {
            store.add_images("Bob", &[JPEG.to_vec()]).unwrap();
        }
        assert_eq!(store.images("Bob").unwrap().len(), 3);
    }

    #[test]
    fn leftover_temp_file_moves_to_next_name() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let alice = dir.path().join("Alice");
        fs::create_dir_all(&alice).unwrap();
        fs::write(alice.join(".Alice_1_1.jpg.tmp"), b"half").unwrap();

        assert!(!store.write_new(&alice, "Alice_1_1.jpg", JPEG).unwrap());
        assert!(!alice.join("Alice_1_1.jpg").exists());
        assert!(store.write_new(&alice, "Alice_1_2.jpg", JPEG).unwrap());

        let listed = store.images("Alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Alice_1_2.jpg");
    }

    #[test]
    fn ignores_hidden_and_non_image_files() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());
        store.add_images("Alice", &[JPEG.to_vec()]).unwrap();

        fs::write(dir.path().join("Alice").join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("Alice").join(".partial.jpg.tmp"), b"x").unwrap();
        fs::write(dir.path().join("stray.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();

        assert_eq!(store.identities().unwrap().len(), 1);
        assert_eq!(store.images("Alice").unwrap().len(), 1);
    }

    #[test]
    fn fingerprint_tracks_rewritten_bytes() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let added = store.add_images("Alice", &[b"aaaa".to_vec()]).unwrap();
        let before = store.images("Alice").unwrap()[0].fingerprint.clone();
        assert_eq!(before, added[0].fingerprint);

        // Same length, different content.
        fs::write(dir.path().join("Alice").join(&added[0].name), b"bbbb").unwrap();
        let after = store.images("Alice").unwrap()[0].fingerprint.clone();
        assert_ne!(before, after);
    }

    #[test]
    fn remove_image_drops_empty_identity() {
        let dir = tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let added = store.add_images("Alice", &[JPEG.to_vec()]).unwrap();
        store.remove_image(&added[0]).unwrap();
        assert!(store.identities().unwrap().is_empty());
    }
}
