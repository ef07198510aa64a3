//! Handler-facing case routes (bearer token from the identity provider)
//!
//! - GET  /api/cases/{caseId}/thread
//! - POST /api/cases/{caseId}/status
//! - POST /api/cases/{caseId}/messages
//! - POST /api/cases/{caseId}/break-glass
//! - GET  /api/cases/{caseId}/break-glass/{grantId}
//! - POST /api/channels

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::{bearer_token, json_response, parse_json_body, path_case_id, BoxBody};
use crate::audit::RequestContext;
use crate::auth::Actor;
use crate::cases::{AttachmentRef, CaseStatus};
use crate::server::AppState;
use crate::types::{CaseGateError, Result};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct HandlerMessageRequest {
    pub body: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Deserialize)]
pub struct BreakGlassRequest {
    pub justification: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub slug: String,
}

/// Resolve the calling handler from the Authorization header
pub fn authenticate_actor(state: &AppState, req: &Request<Incoming>) -> Result<Actor> {
    state.actors.resolve(bearer_token(req)?)
}

/// GET /api/cases/{caseId}/thread
pub async fn handle_handler_thread(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;

    let thread = state.cases.handler_thread(&actor, &case_id, &ctx).await?;
    Ok(json_response(StatusCode::OK, &thread))
}

/// POST /api/cases/{caseId}/status
pub async fn handle_set_status(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;
    let request: StatusRequest = parse_json_body(req).await?;

    let status = CaseStatus::parse(&request.status)
        .ok_or_else(|| CaseGateError::Validation(format!("Unknown status '{}'", request.status)))?;

    let summary = state.cases.set_status(&actor, &case_id, status, &ctx).await?;
    Ok(json_response(StatusCode::OK, &summary))
}

/// POST /api/cases/{caseId}/messages
pub async fn handle_handler_message(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;
    let request: HandlerMessageRequest = parse_json_body(req).await?;

    let message = state
        .cases
        .post_handler_message(
            &actor,
            &case_id,
            &request.body,
            request.internal,
            request.attachments,
            &ctx,
        )
        .await?;
    Ok(json_response(StatusCode::CREATED, &message))
}

/// POST /api/cases/{caseId}/break-glass
pub async fn handle_break_glass(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;
    let request: BreakGlassRequest = parse_json_body(req).await?;

    let grant = state
        .break_glass
        .break_glass(&actor, &case_id, &request.justification, &ctx)
        .await?;
    Ok(json_response(StatusCode::CREATED, &grant))
}

/// GET /api/cases/{caseId}/break-glass/{grantId}
pub async fn handle_grant_read(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    grant_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let case_id = path_case_id(raw_case_id)?;

    let view = state
        .break_glass
        .read_with_grant(&actor, &case_id, grant_id, &ctx)
        .await?;
    Ok(json_response(StatusCode::OK, &view))
}

/// POST /api/channels
pub async fn handle_ensure_channel(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>> {
    let actor = authenticate_actor(&state, &req)?;
    let request: ChannelRequest = parse_json_body(req).await?;

    let channel = state.cases.ensure_channel(&actor, &request.slug).await?;
    Ok(json_response(StatusCode::OK, &channel))
}
