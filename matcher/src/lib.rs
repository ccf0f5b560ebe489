//! Nearest-neighbor identity matching.
//!
//! [`Matcher::decide`] compares a query embedding against every cache entry
//! with one fixed [`Metric`], picks the closest entry and applies the
//! acceptance threshold:
//!
//! ```text
//! no entries              -> NoCandidates
//! distance <  threshold   -> Granted(identity, distance)
//! distance >= threshold   -> Denied(identity, distance)
//! ```
//!
//! Ties on distance resolve by identity, then fingerprint, so the result
//! never depends on entry order.

mod error;
mod matcher;
mod metric;

pub use error::MatchError;
pub use matcher::{DEFAULT_THRESHOLD, MatchCandidate, MatchDecision, Matcher, MatcherConfig};
pub use metric::{Metric, cosine_distance, euclidean_distance, euclidean_l2_distance};
