//! Reporter inbox
//!
//! - POST /api/inbox/auth                  - check (caseId, caseKey)
//! - GET  /api/inbox/{caseId}/messages     - thread, key in `X-Case-Key`
//! - POST /api/inbox/{caseId}/messages     - reply, key in the body
//!
//! There is no reporter session: every request carries the case key and a
//! CAPTCHA token again.

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{header_str, json_response, parse_json_body, BoxBody};
use crate::audit::RequestContext;
use crate::cases::{AttachmentRef, CaseStatus};
use crate::guard::ReporterMessageView;
use crate::identity::{CaseId, CaseKey};
use crate::server::AppState;
use crate::types::Result;

pub const CASE_KEY_HEADER: &str = "x-case-key";
pub const CAPTCHA_TOKEN_HEADER: &str = "x-captcha-token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxAuthRequest {
    pub case_id: String,
    pub case_key: String,
    #[serde(default)]
    pub captcha_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxPostRequest {
    pub case_key: String,
    pub body: String,
    #[serde(default)]
    pub captcha_token: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxThreadResponse<'a> {
    pub case_id: &'a CaseId,
    pub status: CaseStatus,
    pub messages: Vec<ReporterMessageView>,
}

/// POST /api/inbox/auth
pub async fn handle_inbox_auth(
    state: Arc<AppState>,
    req: Request<Incoming>,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let request: InboxAuthRequest = parse_json_body(req).await?;
    let key = CaseKey::from_presented(request.case_key);

    state
        .guard
        .authenticate(&request.case_id, &key, request.captcha_token.as_deref(), &ctx)
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "ok": true }),
    ))
}

/// GET /api/inbox/{caseId}/messages
pub async fn handle_inbox_list(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let key = CaseKey::from_presented(header_str(&req, CASE_KEY_HEADER).unwrap_or_default());
    let captcha = header_str(&req, CAPTCHA_TOKEN_HEADER);

    let session = state
        .guard
        .authenticate(raw_case_id, &key, captcha, &ctx)
        .await?;
    let messages = state.guard.list_thread(&session).await?;

    Ok(json_response(
        StatusCode::OK,
        &InboxThreadResponse {
            case_id: session.case_id(),
            status: session.status(),
            messages,
        },
    ))
}

/// POST /api/inbox/{caseId}/messages
pub async fn handle_inbox_post(
    state: Arc<AppState>,
    req: Request<Incoming>,
    raw_case_id: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let request: InboxPostRequest = parse_json_body(req).await?;
    let key = CaseKey::from_presented(request.case_key);

    let session = state
        .guard
        .authenticate(raw_case_id, &key, request.captcha_token.as_deref(), &ctx)
        .await?;
    let message = state
        .guard
        .post_reporter_message(&session, &request.body, request.attachments)
        .await?;

    Ok(json_response(StatusCode::CREATED, &message))
}
