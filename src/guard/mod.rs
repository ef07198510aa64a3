//! Reporter-side access control: attempt limiting and inbox thread access

pub mod rate_limit;
pub mod thread;

pub use rate_limit::AttemptLimiter;
pub use thread::{GuardLimits, ReporterMessageView, ReporterSession, ThreadAccessGuard};
