use std::cmp::Ordering;
use std::fmt;

use facegate_embedcache::CacheEntry;
use facegate_gallery::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::{MatchError, Metric};

/// Default acceptance threshold; lower distance means a stronger match.
pub const DEFAULT_THRESHOLD: f32 = 0.40;

/// Controls matcher behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Distance metric. Default: euclidean_l2.
    #[serde(default)]
    pub metric: Metric,

    /// A match is accepted iff `distance < threshold`. Default: 0.40.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// One cache entry scored against a query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub identity: String,
    pub fingerprint: Fingerprint,
    pub distance: f32,
}

impl MatchCandidate {
    /// Total order: distance, then identity, then fingerprint.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.identity.cmp(&other.identity))
            .then_with(|| self.fingerprint.cmp(&other.fingerprint))
    }
}

/// Outcome of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MatchDecision {
    /// Closest identity is within the threshold.
    Granted { identity: String, distance: f32 },
    /// Closest identity is too far away; it is still reported.
    Denied { identity: String, distance: f32 },
    /// Nothing to compare against.
    NoCandidates,
}

impl MatchDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, MatchDecision::Granted { .. })
    }

    /// The closest identity, if there was one.
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchDecision::Granted { identity, .. } | MatchDecision::Denied { identity, .. } => {
                Some(identity)
            }
            MatchDecision::NoCandidates => None,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchDecision::Granted { distance, .. } | MatchDecision::Denied { distance, .. } => {
                Some(*distance)
            }
            MatchDecision::NoCandidates => None,
        }
    }
}

impl fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchDecision::Granted { identity, distance } => {
                write!(f, "granted: {identity} (distance {distance:.4})")
            }
            MatchDecision::Denied { identity, distance } => {
                write!(f, "denied: closest is {identity} (distance {distance:.4})")
            }
            MatchDecision::NoCandidates => write!(f, "denied: no match found"),
        }
    }
}

/// Stateless nearest-neighbor matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    cfg: MatcherConfig,
}

impl Matcher {
    /// Creates a matcher. Fails if the threshold is not a finite positive
    /// number.
    pub fn new(cfg: MatcherConfig) -> Result<Self, MatchError> {
        if !cfg.threshold.is_finite() || cfg.threshold <= 0.0 {
            return Err(MatchError::InvalidThreshold(cfg.threshold));
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    fn score(&self, query: &[f32], entry: &CacheEntry) -> MatchCandidate {
        MatchCandidate {
            identity: entry.identity.clone(),
            fingerprint: entry.fingerprint.clone(),
            distance: self.cfg.metric.distance(query, &entry.vector),
        }
    }

    /// Returns the `k` closest entries, closest first.
    pub fn rank(&self, query: &[f32], entries: &[CacheEntry], k: usize) -> Vec<MatchCandidate> {
        let mut scored: Vec<MatchCandidate> =
            entries.iter().map(|e| self.score(query, e)).collect();
        scored.sort_by(MatchCandidate::rank_cmp);
        scored.truncate(k);
        scored
    }

    /// Returns the closest entry, or None if there are no entries.
    pub fn nearest(&self, query: &[f32], entries: &[CacheEntry]) -> Option<MatchCandidate> {
        entries
            .iter()
            .map(|e| self.score(query, e))
            .min_by(MatchCandidate::rank_cmp)
    }

    /// Resolves a query to exactly one decision.
    pub fn decide(&self, query: &[f32], entries: &[CacheEntry]) -> MatchDecision {
        let Some(best) = self.nearest(query, entries) else {
            return MatchDecision::NoCandidates;
        };
        if best.distance < self.cfg.threshold {
            MatchDecision::Granted {
                identity: best.identity,
                distance: best.distance,
            }
        } else {
            MatchDecision::Denied {
                identity: best.identity,
                distance: best.distance,
            }
        }
    }
}
