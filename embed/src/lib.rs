//! Face embedder boundary.
//!
//! An [`Embedder`] turns one image into one fixed-length vector. The model
//! behind it is a black box; the only things facegate relies on are the
//! [`ModelConfig`] (identifier and dimension) and the distinction between
//! "no face in this image" ([`EmbedError::NoFace`]) and every other failure.

pub mod config;
pub mod embed;
pub mod error;
pub mod http;

pub use config::{EmbedConfig, ModelConfig};
pub use embed::Embedder;
pub use error::EmbedError;
pub use http::HttpEmbedder;
