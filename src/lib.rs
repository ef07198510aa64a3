//! Casegate - confidential case intake and reporter inbox
//!
//! A reporter files a report without an account and receives a case id and a
//! one-time case key. The key is stored only as a digest; the pair later
//! unlocks a private thread with the organization's case handlers.
//!
//! ## Services
//!
//! - **Identity**: case id / case key generation and constant-time verification
//! - **Sealing**: per-organization authenticated encryption of reporter contact details
//! - **Guard**: CAPTCHA-gated, rate-limited reporter inbox access
//! - **Cases**: intake, status state machine and handler operations
//! - **Break-glass**: audited emergency access to a case
//! - **SLA**: acknowledgement / feedback deadlines and the notification sweep
//! - **Audit**: append-only record of privileged actions

pub mod audit;
pub mod auth;
pub mod breakglass;
pub mod cases;
pub mod config;
pub mod guard;
pub mod identity;
pub mod routes;
pub mod sealing;
pub mod server;
pub mod sla;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CaseGateError, Result};
