//! Public report intake
//!
//! - POST /api/channels/{slug}/reports - file a report, returns the case key once

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::{json_response, parse_json_body, BoxBody};
use crate::audit::RequestContext;
use crate::cases::NewReport;
use crate::server::AppState;
use crate::types::Result;

/// POST /api/channels/{slug}/reports
pub async fn handle_create_report(
    state: Arc<AppState>,
    req: Request<Incoming>,
    slug: &str,
    ctx: RequestContext,
) -> Result<Response<BoxBody>> {
    let report: NewReport = parse_json_body(req).await?;
    let receipt = state.intake.create_case(slug, report, &ctx).await?;
    Ok(json_response(StatusCode::CREATED, &receipt))
}
