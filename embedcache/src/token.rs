use std::collections::BTreeSet;
use std::fmt;

use facegate_embed::ModelConfig;
use facegate_gallery::{Fingerprint, GalleryImage};
use serde::{Deserialize, Serialize};

const TOKEN_DOMAIN: &[u8] = b"facegate:cache-token:v1\0";

/// Summary of gallery contents and embedding model.
///
/// Two galleries yield the same token iff they hold the same set of
/// (identity, fingerprint) pairs and are embedded by the same model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidityToken(String);

impl ValidityToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..self.0.len().min(16)])
    }
}

/// Computes the validity token for a gallery snapshot under `model`.
///
/// Input order does not matter and duplicate (identity, fingerprint) pairs
/// count once.
pub fn compute_token(model: &ModelConfig, images: &[GalleryImage]) -> ValidityToken {
    let pairs: BTreeSet<(&str, &Fingerprint)> = images
        .iter()
        .map(|img| (img.identity.as_str(), &img.fingerprint))
        .collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(TOKEN_DOMAIN);
    hasher.update(model.model.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(model.dimension as u64).to_le_bytes());
    for (identity, fp) in pairs {
        // Identities never contain NUL (control characters are refused).
        hasher.update(identity.as_bytes());
        hasher.update(&[0]);
        hasher.update(fp.as_str().as_bytes());
        hasher.update(&[0]);
    }
    ValidityToken(hasher.finalize().to_hex().to_string())
}
