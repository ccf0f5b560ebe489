use std::sync::Arc;
use std::time::Duration;

use facegate_audit::{AuditError, AuditLog, LogRecord, Status};
use facegate_embed::{EmbedError, Embedder};
use facegate_embedcache::{EmbeddingCache, RebuildReport};
use facegate_gallery::GalleryStore;
use facegate_matcher::{MatchDecision, Matcher, MatcherConfig};
use tracing::{debug, info, warn};

use crate::enroll::{Enrolled, enroll};
use crate::GateError;

/// Default deadline for one check-in.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configures a [`Gate`].
pub struct GateConfig {
    /// Enrollment gallery. Required.
    pub gallery: Arc<dyn GalleryStore>,

    /// Embedding cache derived from the gallery. Required.
    pub cache: Arc<EmbeddingCache>,

    /// Face embedder used for both gallery and query images. Required.
    pub embedder: Arc<dyn Embedder>,

    /// Receives one record per check-in. Required.
    pub audit: Arc<dyn AuditLog>,

    pub matcher: MatcherConfig,

    /// Deadline covering query embedding, cache rebuild and matching.
    /// Zero disables the deadline.
    pub timeout: Duration,
}

/// What a check-in resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A face was found in the query and matched against the cache.
    Decided(MatchDecision),
    /// The query image holds no usable face. Distinct from "no match".
    NoFaceDetected,
}

impl Outcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Outcome::Decided(d) if d.is_granted())
    }

    /// The audit record describing this outcome.
    pub fn record(&self) -> LogRecord {
        match self {
            Outcome::Decided(MatchDecision::Granted { identity, distance }) => {
                LogRecord::now(Some(identity.as_str()), Status::AccessGranted, Some(*distance))
            }
            Outcome::Decided(MatchDecision::Denied { identity, distance }) => {
                LogRecord::now(Some(identity.as_str()), Status::AccessDenied, Some(*distance))
            }
            Outcome::Decided(MatchDecision::NoCandidates) => {
                LogRecord::now(None, Status::AccessDenied, None)
            }
            Outcome::NoFaceDetected => LogRecord::now(None, Status::NoFaceDetected, None),
        }
    }
}

/// Result of one check-in.
#[derive(Debug)]
pub struct CheckIn {
    pub outcome: Outcome,
    /// The record handed to the audit log.
    pub record: LogRecord,
    /// Set when this check-in had to rebuild the cache.
    pub rebuilt: Option<RebuildReport>,
    /// Set when the audit record could not be written. The outcome stands.
    pub audit_error: Option<AuditError>,
}

/// Enrollment and check-in entry point. Safe for concurrent use.
pub struct Gate {
    gallery: Arc<dyn GalleryStore>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<dyn AuditLog>,
    matcher: Matcher,
    timeout: Duration,
}

impl Gate {
    /// Creates a gate. Fails if the matcher configuration is invalid.
    pub fn new(cfg: GateConfig) -> Result<Self, GateError> {
        Ok(Self {
            matcher: Matcher::new(cfg.matcher)?,
            gallery: cfg.gallery,
            cache: cfg.cache,
            embedder: cfg.embedder,
            audit: cfg.audit,
            timeout: cfg.timeout,
        })
    }

    pub fn gallery(&self) -> &dyn GalleryStore {
        &*self.gallery
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Enrolls images for one identity. See [`enroll`].
    pub fn enroll(&self, identity: &str, images: &[Vec<u8>]) -> Result<Enrolled, GateError> {
        enroll(&*self.gallery, &self.cache, identity, images)
    }

    /// Matches one query image and records the attempt.
    ///
    /// Errors are returned only when no outcome could be reached (bad input,
    /// embedder failure, timeout, storage failure); nothing is logged then.
    /// A failed audit write does not discard the outcome; it is reported in
    /// [`CheckIn::audit_error`].
    pub async fn check_in(&self, image: &[u8]) -> Result<CheckIn, GateError> {
        if image.is_empty() {
            return Err(GateError::InvalidInput("query image is empty".into()));
        }

        let (outcome, rebuilt) = if self.timeout.is_zero() {
            self.evaluate(image).await?
        } else {
            tokio::time::timeout(self.timeout, self.evaluate(image))
                .await
                .map_err(|_| GateError::Timeout(self.timeout))??
        };

        let record = outcome.record();
        let audit_error = match self.audit.append(&record) {
            Ok(()) => None,
            Err(e) => {
                warn!("gate: audit record not written: {e}");
                Some(e)
            }
        };
        info!(
            "gate: check-in {} {} {}",
            record.name,
            record.status,
            record.distance_str()
        );

        Ok(CheckIn {
            outcome,
            record,
            rebuilt,
            audit_error,
        })
    }

    async fn evaluate(
        &self,
        image: &[u8],
    ) -> Result<(Outcome, Option<RebuildReport>), GateError> {
        let query = match self.embedder.embed(image).await {
            Ok(v) => v,
            Err(EmbedError::NoFace) => return Ok((Outcome::NoFaceDetected, None)),
            Err(e) => return Err(e.into()),
        };
        let dimension = self.embedder.model().dimension;
        if query.len() != dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: dimension,
                got: query.len(),
            }
            .into());
        }

        let fresh = self
            .cache
            .ensure_fresh(&*self.gallery, &*self.embedder)
            .await?;
        debug!("gate: matching against {} entries", fresh.entries.len());
        let decision = self.matcher.decide(&query, &fresh.entries);
        Ok((Outcome::Decided(decision), fresh.rebuilt))
    }

    /// Rebuilds the cache now. With `full`, every stored vector is dropped
    /// first so the whole gallery is embedded again.
    pub async fn rebuild(&self, full: bool) -> Result<RebuildReport, GateError> {
        if full {
            self.cache.purge()?;
        }
        Ok(self.cache.rebuild(&*self.gallery, &*self.embedder).await?)
    }

    /// Enrolled identities with their image counts, ordered by identity.
    pub fn identities(&self) -> Result<Vec<(String, usize)>, GateError> {
        let mut out = Vec::new();
        for identity in self.gallery.identities()? {
            let count = self.gallery.images(&identity)?.len();
            out.push((identity, count));
        }
        Ok(out)
    }

    /// Audit records, oldest first.
    pub fn records(&self) -> Result<Vec<LogRecord>, GateError> {
        Ok(self.audit.records()?)
    }
}
