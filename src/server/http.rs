//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, and a hand-written
//! `(Method, path)` router.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::{spawn_cleanup_task, AppState};
use crate::routes::{self, BoxBody};
use crate::sla::spawn_sla_scheduler;
use crate::types::{CaseGateError, Result};

/// How often expired limiter entries and grants are dropped
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Casegate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - insecure default secrets in use");
    }
    if state.args.trust_forwarded_for {
        info!("Client addresses taken from X-Forwarded-For");
    }

    spawn_cleanup_task(Arc::clone(&state), CLEANUP_INTERVAL);

    if state.args.sweep_interval_seconds > 0 {
        spawn_sla_scheduler(
            Arc::clone(&state.sla),
            Duration::from_secs(state.args.sweep_interval_seconds),
        );
    } else {
        info!("In-process SLA scheduler disabled, relying on POST /api/sla/sweep");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection: {:?}", err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // Client addresses are hashed before they reach the audit log; never log them
    debug!("{} {}", method, path);

    let ctx = routes::request_context(&req, addr, state.args.trust_forwarded_for);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::OPTIONS, _) => Ok(routes::preflight_response()),

        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => {
            Ok(routes::health_check(Arc::clone(&state)))
        }
        (&Method::GET, ["version"]) => Ok(routes::version_info()),

        // Reporter surface
        (&Method::POST, ["api", "channels", slug, "reports"]) => {
            routes::handle_create_report(Arc::clone(&state), req, slug, ctx).await
        }
        (&Method::POST, ["api", "inbox", "auth"]) => {
            routes::handle_inbox_auth(Arc::clone(&state), req, ctx).await
        }
        (&Method::GET, ["api", "inbox", case_id, "messages"]) => {
            routes::handle_inbox_list(Arc::clone(&state), req, case_id, ctx).await
        }
        (&Method::POST, ["api", "inbox", case_id, "messages"]) => {
            routes::handle_inbox_post(Arc::clone(&state), req, case_id, ctx).await
        }

        // Handler surface
        (&Method::GET, ["api", "cases", case_id, "thread"]) => {
            routes::handle_handler_thread(Arc::clone(&state), req, case_id, ctx).await
        }
        (&Method::POST, ["api", "cases", case_id, "status"]) => {
            routes::handle_set_status(Arc::clone(&state), req, case_id, ctx).await
        }
        (&Method::POST, ["api", "cases", case_id, "messages"]) => {
            routes::handle_handler_message(Arc::clone(&state), req, case_id, ctx).await
        }
        (&Method::GET, ["api", "cases", case_id, "sla"]) => {
            routes::handle_sla_query(Arc::clone(&state), req, case_id).await
        }
        (&Method::POST, ["api", "cases", case_id, "break-glass"]) => {
            routes::handle_break_glass(Arc::clone(&state), req, case_id, ctx).await
        }
        (&Method::GET, ["api", "cases", case_id, "break-glass", grant_id]) => {
            routes::handle_grant_read(Arc::clone(&state), req, case_id, grant_id, ctx).await
        }
        (&Method::POST, ["api", "channels"]) => {
            routes::handle_ensure_channel(Arc::clone(&state), req).await
        }
        (&Method::GET, ["api", "sla", "policy"]) => {
            routes::handle_get_policy(Arc::clone(&state), req).await
        }
        (&Method::PUT, ["api", "sla", "policy"]) => {
            routes::handle_put_policy(Arc::clone(&state), req, ctx).await
        }

        // Scheduler trigger
        (&Method::POST, ["api", "sla", "sweep"]) => {
            routes::handle_sla_sweep(Arc::clone(&state), req).await
        }

        _ => Ok(routes::not_found_response(&path)),
    };

    Ok(result.unwrap_or_else(|err: CaseGateError| routes::error_response(&err)))
}
