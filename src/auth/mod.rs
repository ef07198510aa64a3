//! Authentication and authorization for casegate
//!
//! - Handler identity: bearer JWT from the external identity provider,
//!   resolved to an [`Actor`] with an organization [`Role`]
//! - Machine callers: shared secret for the SLA sweep trigger
//! - Reporters: no accounts; CAPTCHA plus (case id, case key) per request

pub mod actor;
pub mod captcha;
pub mod roles;
pub mod shared_secret;

pub use actor::{Actor, ActorResolver, Claims, JwtActorResolver};
pub use captcha::{CaptchaVerifier, HttpCaptchaVerifier, StaticCaptchaVerifier};
pub use roles::{is_operation_allowed, operation_description, require, required_role, Role};
pub use shared_secret::{SharedSecretValidator, SWEEP_SECRET_HEADER};
