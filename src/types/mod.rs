//! Shared types for casegate

pub mod error;

pub use error::{CaseGateError, Result};
