//! Embedding cache for facegate.
//!
//! The cache holds one vector per gallery image, keyed by
//! (identity, fingerprint), plus a validity token summarising the gallery
//! contents and the embedding model. It is derived state: deleting it and
//! calling [`EmbeddingCache::rebuild`] always reproduces it.
//!
//! # Validity
//!
//! ```text
//! Invalid --rebuild--> Valid --gallery mutation / invalidate--> Invalid
//! ```
//!
//! A freshly opened cache is valid only if its persisted token matches the
//! current gallery. Rebuilds reuse vectors by fingerprint, so unchanged
//! images are never sent to the embedder twice.
//!
//! # Concurrency
//!
//! At most one rebuild runs at a time; a caller arriving mid-rebuild waits
//! and then finds the cache valid. A rebuild commits only if neither the
//! gallery nor the invalidation generation moved while it ran, otherwise it
//! starts over. Persistence happens in one transaction at commit, so a
//! cancelled (timed out) rebuild leaves the stored cache untouched.

mod cache;
mod entry;
mod error;
pub mod keys;
mod persist;
mod token;


pub use cache::{CacheConfig, EmbeddingCache, Fresh, LoadState};
pub use entry::{CacheEntry, RebuildReport, SkipReason, SkippedImage};
pub use error::CacheError;
pub use token::{ValidityToken, compute_token};
