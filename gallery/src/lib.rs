//! Enrollment gallery for facegate.
//!
//! The gallery is the source of truth for who is enrolled: a set of
//! identities, each owning one or more reference images. Every image carries
//! a content [`Fingerprint`] so derived data (the embedding cache) can tell
//! whether an image changed without trusting file metadata.
//!
//! Two stores are provided:
//!
//! - [`DirStore`]: one directory per identity under a root, the layout used
//!   by the door camera deployment.
//! - [`MemoryStore`]: in-memory, for tests.

mod dir;
mod error;
mod fingerprint;
mod memory;
mod store;

pub use dir::DirStore;
pub use error::GalleryError;
pub use fingerprint::{Fingerprint, fingerprint};
pub use memory::MemoryStore;
pub use store::{GalleryImage, GalleryStore, image_extension, image_name, validate_identity};
