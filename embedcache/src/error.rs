use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("embedcache: gallery error: {0}")]
    Gallery(String),

    #[error("embedcache: storage error: {0}")]
    Storage(String),

    #[error("embedcache: corrupt cache: {0}")]
    Corrupt(String),

    #[error("embedcache: gallery kept changing, gave up after {attempts} rebuild attempts")]
    GalleryUnstable { attempts: usize },
}

impl From<facegate_gallery::GalleryError> for CacheError {
    fn from(e: facegate_gallery::GalleryError) -> Self {
        CacheError::Gallery(e.to_string())
    }
}

impl From<facegate_kv::KVError> for CacheError {
    fn from(e: facegate_kv::KVError) -> Self {
        CacheError::Storage(e.to_string())
    }
}
