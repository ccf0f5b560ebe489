//! Enrollment and check-in for facegate.
//!
//! [`Gate`] wires the gallery, the embedding cache, the embedder, the
//! matcher and the audit log together:
//!
//! ```text
//! enroll:   validate -> gallery.add_images -> cache.invalidate
//! check_in: embed query -> cache.ensure_fresh -> matcher.decide -> audit.append
//! ```
//!
//! A query with no detectable face resolves to [`Outcome::NoFaceDetected`],
//! never to a failed match.

mod enroll;
mod error;
mod gate;

pub use enroll::{Enrolled, enroll};
pub use error::GateError;
pub use gate::{CheckIn, DEFAULT_TIMEOUT, Gate, GateConfig, Outcome};
