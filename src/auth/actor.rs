//! Authenticated handler identity
//!
//! The identity provider is external. [`ActorResolver`] is the seam: the HTTP
//! layer hands it the bearer token and gets back who is acting, for which
//! organization, with which role.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - `org` and `role` come from the token; nothing in a request body can
//!   change them

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::{CaseGateError, Result};

/// Who is performing a handler-side operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub org_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, org_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: org_id.into(),
            role,
        }
    }
}

/// Resolves the current actor from a presented credential
pub trait ActorResolver: Send + Sync {
    fn resolve(&self, bearer_token: &str) -> Result<Actor>;
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id at the identity provider
    pub sub: String,
    /// Organization the session is scoped to
    pub org: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// HS256 bearer-token adapter for the identity provider
#[derive(Clone)]
pub struct JwtActorResolver {
    secret: String,
    expiry_seconds: u64,
}

impl JwtActorResolver {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(CaseGateError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(CaseGateError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Issue a token for `actor`.
    ///
    /// Production tokens come from the identity provider; this exists for dev
    /// mode and tests.
    pub fn generate_token(&self, actor: &Actor) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CaseGateError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: actor.user_id.clone(),
            org: actor.org_id.clone(),
            role: actor.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }
}

impl ActorResolver for JwtActorResolver {
    fn resolve(&self, bearer_token: &str) -> Result<Actor> {
        let token_data = decode::<Claims>(
            bearer_token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let error_msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            };
            CaseGateError::Unauthorized(error_msg.into())
        })?;

        let claims = token_data.claims;
        if claims.sub.is_empty() || claims.org.is_empty() {
            return Err(CaseGateError::Unauthorized("Incomplete token claims".into()));
        }

        Ok(Actor {
            user_id: claims.sub,
            org_id: claims.org,
            role: claims.role,
        })
    }
}
