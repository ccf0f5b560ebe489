//! CLI commands module.

mod check_in;
mod enroll;
mod identities;
mod log;
mod rebuild;
mod util;

pub use check_in::CheckInCommand;
pub use enroll::EnrollCommand;
pub use identities::IdentitiesCommand;
pub use log::LogCommand;
pub use rebuild::RebuildCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
