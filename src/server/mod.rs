//! HTTP server and shared application state

pub mod http;

pub use http::run;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::audit::AuditLog;
use crate::auth::{ActorResolver, CaptchaVerifier, JwtActorResolver, SharedSecretValidator};
use crate::breakglass::BreakGlassService;
use crate::cases::{CaseService, IntakeService};
use crate::config::Args;
use crate::guard::{GuardLimits, ThreadAccessGuard};
use crate::sealing::{EncryptionCodec, HkdfKeyResolver};
use crate::sla::{Mailer, SlaEngine};
use crate::store::Store;
use crate::types::Result;

/// Lifetime of handler tokens minted by [`JwtActorResolver::generate_token`]
const TOKEN_EXPIRY_SECONDS: u64 = 3600;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn Store>,
    pub audit: AuditLog,
    pub intake: IntakeService,
    /// Reporter inbox access (CAPTCHA, attempt limits, key verification)
    pub guard: ThreadAccessGuard,
    pub cases: CaseService,
    pub break_glass: BreakGlassService,
    pub sla: Arc<SlaEngine>,
    /// Adapter for the external identity provider
    pub actors: Arc<dyn ActorResolver>,
    pub sweep_secret: SharedSecretValidator,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service over one store
    pub fn new(
        args: Args,
        store: Arc<dyn Store>,
        captcha: Arc<dyn CaptchaVerifier>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let keys = HkdfKeyResolver::with_retired(
            args.root_key_version,
            args.root_key()?,
            args.retired_root_keys()?,
        );
        let codec = EncryptionCodec::new(Arc::new(keys));
        let audit = AuditLog::new(Arc::clone(&store), args.audit_hash_salt()?);

        let limits = GuardLimits {
            max_attempts: args.auth_max_attempts,
            max_attempts_per_address: args.auth_max_attempts_per_address,
            window_seconds: args.auth_window_seconds,
        };

        let actors: Arc<dyn ActorResolver> = Arc::new(JwtActorResolver::new(
            args.jwt_secret()?,
            TOKEN_EXPIRY_SECONDS,
        )?);
        let sweep_secret = SharedSecretValidator::new(args.sweep_secret()?)?;

        Ok(Self {
            intake: IntakeService::new(
                Arc::clone(&store),
                codec.clone(),
                Arc::clone(&captcha),
                audit.clone(),
            ),
            guard: ThreadAccessGuard::new(Arc::clone(&store), captcha, limits),
            cases: CaseService::new(Arc::clone(&store), audit.clone()),
            break_glass: BreakGlassService::new(Arc::clone(&store), codec.clone(), audit.clone()),
            sla: Arc::new(SlaEngine::new(
                Arc::clone(&store),
                codec,
                mailer,
                audit.clone(),
            )),
            actors,
            sweep_secret,
            audit,
            store,
            args,
            started_at: Instant::now(),
        })
    }
}

/// Periodically drop expired attempt counters and break-glass grants
pub fn spawn_cleanup_task(state: Arc<AppState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!("Starting cleanup task (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.guard.cleanup();
            let removed = state.break_glass.cleanup_expired();
            if removed > 0 {
                debug!("Cleanup: removed {} expired grants", removed);
            }
        }
    })
}
