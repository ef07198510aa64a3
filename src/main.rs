//! Casegate - confidential case intake and reporter inbox

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casegate::{
    auth::{
        Actor, CaptchaVerifier, HttpCaptchaVerifier, JwtActorResolver, Role,
        StaticCaptchaVerifier,
    },
    config::Args,
    server::{self, AppState},
    sla::{HttpMailer, LogMailer, Mailer},
    store::{MemoryStore, MongoClient, MongoStore, Store},
};

/// Organization and channel seeded into the in-memory store in dev mode
const DEV_ORG_ID: &str = "dev-org";
const DEV_CHANNEL_SLUG: &str = "dev-reports";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("casegate={},info", args.log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Casegate - confidential case intake");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Root key version: {}", args.root_key_version);
    info!(
        "Inbox limits: {} per case / {} per address every {}s",
        args.auth_max_attempts, args.auth_max_attempts_per_address, args.auth_window_seconds
    );
    info!("======================================");

    let store: Arc<dyn Store> = if args.dev_mode {
        warn!("Using in-memory store (dev mode) - data is lost on restart");
        let store = MemoryStore::new();
        let channel = store
            .ensure_default_channel(DEV_ORG_ID, DEV_CHANNEL_SLUG)
            .await?;
        info!(
            "Dev channel: POST /api/channels/{}/reports (org {})",
            channel.slug, channel.org_id
        );
        Arc::new(store)
    } else {
        let client = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                client
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };
        Arc::new(MongoStore::new(&client).await?)
    };

    let mailer: Arc<dyn Mailer> = match args.mail_api_url {
        Some(ref url) => {
            info!("Notifications via mail API");
            Arc::new(HttpMailer::new(
                url.clone(),
                args.mail_api_key.clone(),
                args.mail_from.clone(),
                args.request_timeout(),
            ))
        }
        None => {
            warn!("MAIL_API_URL not set - notifications are only logged");
            Arc::new(LogMailer)
        }
    };

    let captcha: Arc<dyn CaptchaVerifier> = match args.captcha_secret {
        Some(ref secret) => Arc::new(HttpCaptchaVerifier::new(
            args.captcha_verify_url.clone(),
            secret.clone(),
            args.request_timeout(),
        )),
        None => {
            warn!("CAPTCHA_SECRET not set - accepting any non-empty CAPTCHA token (dev mode)");
            Arc::new(StaticCaptchaVerifier::permissive())
        }
    };

    if args.dev_mode {
        let tokens = JwtActorResolver::new(args.jwt_secret()?, 24 * 3600)?;
        let admin = Actor::new("dev-admin", DEV_ORG_ID, Role::Admin);
        info!("Dev admin token: {}", tokens.generate_token(&admin)?);
    }

    let state = Arc::new(AppState::new(args, store, captcha, mailer)?);
    server::run(state).await?;

    Ok(())
}
