//! Health and version endpoints

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub node_id: String,
    pub mode: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub sla_scheduler: bool,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// GET /health
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.args.node_id.to_string(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        uptime: state.started_at.elapsed().as_secs(),
        sla_scheduler: state.args.sweep_interval_seconds > 0,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    json_response(StatusCode::OK, &response)
}

/// GET /version
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("CASEGATE_GIT_COMMIT").unwrap_or("unknown"),
        build_time: option_env!("CASEGATE_BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "casegate",
    };

    json_response(StatusCode::OK, &response)
}
