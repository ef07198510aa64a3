//! Configuration for casegate
//!
//! CLI arguments and environment variable handling using clap.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::Parser;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{CaseGateError, Result};

/// Casegate - confidential case intake and reporter inbox gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "casegate")]
#[command(about = "Confidential case intake, reporter inbox and SLA tracking gateway")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store, insecure default secrets)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "casegate")]
    pub mongodb_db: String,

    /// Current root secret for per-organization contact encryption (base64, 32 bytes)
    #[arg(long, env = "ROOT_KEY")]
    pub root_key: Option<String>,

    /// Version tag of ROOT_KEY, stored with every sealed payload
    #[arg(long, env = "ROOT_KEY_VERSION", default_value = "1")]
    pub root_key_version: u32,

    /// Retired root secrets still accepted for opening ("version:base64,...")
    #[arg(long, env = "RETIRED_ROOT_KEYS")]
    pub retired_root_keys: Option<String>,

    /// Secret shared with the identity provider for handler session tokens
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Shared secret for the SLA sweep trigger
    #[arg(long, env = "SWEEP_SECRET")]
    pub sweep_secret: Option<String>,

    /// Salt mixed into audit IP / user agent hashes
    #[arg(long, env = "AUDIT_HASH_SALT")]
    pub audit_hash_salt: Option<String>,

    /// CAPTCHA provider secret
    #[arg(long, env = "CAPTCHA_SECRET")]
    pub captcha_secret: Option<String>,

    /// CAPTCHA siteverify endpoint
    #[arg(
        long,
        env = "CAPTCHA_VERIFY_URL",
        default_value = "https://challenges.cloudflare.com/turnstile/v0/siteverify"
    )]
    pub captcha_verify_url: String,

    /// Outbound mail API endpoint (logs notifications when unset)
    #[arg(long, env = "MAIL_API_URL")]
    pub mail_api_url: Option<String>,

    /// Outbound mail API key
    #[arg(long, env = "MAIL_API_KEY")]
    pub mail_api_key: Option<String>,

    /// Sender address for notifications
    #[arg(long, env = "MAIL_FROM", default_value = "no-reply@casegate.local")]
    pub mail_from: String,

    /// Timeout for outbound calls (store excluded) in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,

    /// Inbox authentication attempts per case id and address per window
    #[arg(long, env = "AUTH_MAX_ATTEMPTS", default_value = "5")]
    pub auth_max_attempts: u32,

    /// Inbox authentication attempts per address across all case ids per window
    #[arg(long, env = "AUTH_MAX_ATTEMPTS_PER_ADDRESS", default_value = "30")]
    pub auth_max_attempts_per_address: u32,

    /// Inbox authentication rate limit window in seconds
    #[arg(long, env = "AUTH_WINDOW_SECONDS", default_value = "900")]
    pub auth_window_seconds: u64,

    /// Take the client address from the first X-Forwarded-For hop
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value = "false")]
    pub trust_forwarded_for: bool,

    /// In-process SLA sweep interval in seconds (0 = rely on the HTTP trigger)
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value = "0")]
    pub sweep_interval_seconds: u64,
}

const DEV_ROOT_KEY: [u8; 32] = *b"dev-only-insecure-root-key-32byt";

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Result<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-only-insecure-jwt-secret-do-not-deploy".to_string()),
            (None, false) => Err(CaseGateError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Get effective sweep secret
    pub fn sweep_secret(&self) -> Result<String> {
        match (&self.sweep_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-only-sweep-secret".to_string()),
            (None, false) => Err(CaseGateError::Config(
                "SWEEP_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Get effective audit hash salt
    pub fn audit_hash_salt(&self) -> Result<String> {
        match (&self.audit_hash_salt, self.dev_mode) {
            (Some(salt), _) => Ok(salt.clone()),
            (None, true) => Ok("dev-only-audit-salt".to_string()),
            (None, false) => Err(CaseGateError::Config(
                "AUDIT_HASH_SALT is required in production mode".into(),
            )),
        }
    }

    /// Decode the current root key
    pub fn root_key(&self) -> Result<[u8; 32]> {
        match (&self.root_key, self.dev_mode) {
            (Some(encoded), _) => decode_root_key(encoded),
            (None, true) => Ok(DEV_ROOT_KEY),
            (None, false) => Err(CaseGateError::Config(
                "ROOT_KEY is required in production mode".into(),
            )),
        }
    }

    /// Decode retired root keys, keyed by version
    pub fn retired_root_keys(&self) -> Result<BTreeMap<u32, [u8; 32]>> {
        let mut keys = BTreeMap::new();
        let Some(ref raw) = self.retired_root_keys else {
            return Ok(keys);
        };

        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (version, encoded) = entry.split_once(':').ok_or_else(|| {
                CaseGateError::Config("RETIRED_ROOT_KEYS entries must be version:base64".into())
            })?;
            let version: u32 = version.trim().parse().map_err(|_| {
                CaseGateError::Config(format!("Invalid retired key version '{}'", version))
            })?;
            if version == self.root_key_version {
                return Err(CaseGateError::Config(format!(
                    "Retired key version {} collides with ROOT_KEY_VERSION",
                    version
                )));
            }
            keys.insert(version, decode_root_key(encoded.trim())?);
        }

        Ok(keys)
    }

    /// Timeout applied to captcha and mail calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.dev_mode {
            let jwt = self.jwt_secret()?;
            if jwt.len() < 32 {
                return Err(CaseGateError::Config(
                    "JWT_SECRET must be at least 32 characters".into(),
                ));
            }
            if self.sweep_secret()?.len() < 16 {
                return Err(CaseGateError::Config(
                    "SWEEP_SECRET must be at least 16 characters".into(),
                ));
            }
            self.audit_hash_salt()?;
            if self.captcha_secret.is_none() {
                return Err(CaseGateError::Config(
                    "CAPTCHA_SECRET is required in production mode".into(),
                ));
            }
        }

        self.root_key()?;
        self.retired_root_keys()?;

        if self.auth_max_attempts == 0
            || self.auth_max_attempts_per_address == 0
            || self.auth_window_seconds == 0
        {
            return Err(CaseGateError::Config(
                "AUTH_MAX_ATTEMPTS, AUTH_MAX_ATTEMPTS_PER_ADDRESS and AUTH_WINDOW_SECONDS must be positive"
                    .into(),
            ));
        }

        Ok(())
    }
}

fn decode_root_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CaseGateError::Config(format!("Root key is not valid base64: {}", e)))?;

    bytes
        .try_into()
        .map_err(|_| CaseGateError::Config("Root key must decode to exactly 32 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["casegate"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_dev_mode_defaults_validate() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.auth_max_attempts, 5);
        assert_eq!(args.root_key().unwrap(), DEV_ROOT_KEY);
    }

    #[test]
    fn test_production_requires_secrets() {
        let args = parse(&[]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_retired_keys_parse() {
        let key = BASE64.encode([7u8; 32]);
        let retired = format!("1:{}", key);
        let args = parse(&["--dev-mode", "--root-key-version", "2", "--retired-root-keys", &retired]);

        let keys = args.retired_root_keys().unwrap();
        assert_eq!(keys.get(&1), Some(&[7u8; 32]));
    }

    #[test]
    fn test_retired_key_version_collision_rejected() {
        let key = BASE64.encode([7u8; 32]);
        let retired = format!("1:{}", key);
        let args = parse(&["--dev-mode", "--retired-root-keys", &retired]);
        assert!(args.retired_root_keys().is_err());
    }

    #[test]
    fn test_zero_attempt_limits_rejected() {
        for flag in [
            "--auth-max-attempts",
            "--auth-max-attempts-per-address",
            "--auth-window-seconds",
        ] {
            let args = parse(&["--dev-mode", flag, "0"]);
            assert!(
                matches!(args.validate(), Err(CaseGateError::Config(_))),
                "{} 0 should be rejected",
                flag
            );
        }
    }

    #[test]
    fn test_short_root_key_rejected() {
        let short = BASE64.encode([1u8; 16]);
        let args = parse(&["--dev-mode", "--root-key", &short]);
        assert!(args.validate().is_err());
    }
}
