//! SLA routes
//!
//! - GET  /api/cases/{caseId}/sla  - deadlines and recent events (bearer)
//! - GET  /api/sla/policy          - organization policy (bearer)
//! - PUT  /api/sla/policy          - replace organization policy (bearer, admin)
//! - POST /api/sla/sweep           - run a sweep (`X-Sweep-Secret`)

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::cases::authenticate_actor;
use super::{header_str, json_response, parse_json_body, path_case_id, query_param, BoxBody};
use crate::audit::RequestContext;
use crate::auth::SWEEP_SECRET_HEADER;
use crate::server::AppState;
use crate::sla::OrgPolicy;
use crate::types::Result;

/// GET /api/cases/{caseId}/sla
pub async fn handle_sla_query(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;

    let report = state.sla.query(&actor, &case_id).await?;
    Ok(json_response(StatusCode::OK, &report))
}

/// GET /api/sla/policy
pub async fn handle_get_policy(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let policy = state.cases.get_policy(&actor).await?;
    Ok(json_response(StatusCode::OK, &policy))
}

/// PUT /api/sla/policy
pub async fn handle_put_policy(
    state: Arc<AppState>,
    req: Request<Incoming>,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let policy: OrgPolicy = parse_json_body(req).await?;

    let saved = state.cases.put_policy(&actor, policy, &ctx).await?;
    Ok(json_response(StatusCode::OK, &saved))
}

/// POST /api/sla/sweep
///
/// Sweeps one organization when `orgId` is given, otherwise all of them.
pub async fn handle_sla_sweep(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>> {
    state
        .sweep_secret
        .validate(header_str(&req, SWEEP_SECRET_HEADER))?;

    let summary = match query_param(req.uri().query(), "orgId") {
        Some(org_id) => state.sla.sweep(&org_id).await?,
        None => state.sla.sweep_all().await?,
    };

    Ok(json_response(StatusCode::OK, &summary))
}
