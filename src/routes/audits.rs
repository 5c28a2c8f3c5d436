//! HTTP routes for the school audit workflow
//!
//! - POST /api/school-audit/start-audit
//! - POST /api/school-audit/end-audit
//! - GET  /api/school-audit/current-audit/{user}
//! - GET  /api/school-audit/audits/{user}?status=&date_from=&date_to=
//! - GET  /api/school-audit/audit-summary/{user}?start_date=&end_date=
//! - GET  /api/school-audit/image/{file_id}?resize=

use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    base_url, bytes_response, cors_preflight, decode_segment, error_response, json_response,
    method_not_allowed, not_found, parse_json_body, query_params, BoxBody, MAX_AUDIT_BODY,
};
use crate::server::AppState;
use crate::types::Result;

const PREFIX: &str = "/api/school-audit";

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    status: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

/// POST /start-audit
async fn handle_start(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: Value = parse_json_body(req, MAX_AUDIT_BODY).await?;
    let result = state.audits.start_audit(&body).await?;
    Ok(json_response(StatusCode::CREATED, &result))
}

/// POST /end-audit
async fn handle_end(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: Value = parse_json_body(req, MAX_AUDIT_BODY).await?;
    let result = state.audits.end_audit(&body).await?;
    Ok(json_response(StatusCode::OK, &result))
}

/// GET /current-audit/{user}
async fn handle_current(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    user: &str,
) -> Result<Response<BoxBody>> {
    let base = base_url(&req);
    let body = match state.audits.current_audit(user, state.args.today()).await? {
        Some(audit) => json!({
            "current_audit": audit.to_json(&base),
            "user_email": user,
        }),
        None => json!({
            "message": "No audit in progress",
            "current_audit": Value::Null,
            "user_email": user,
        }),
    };
    Ok(json_response(StatusCode::OK, &body))
}

/// GET /audits/{user}
async fn handle_history(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    user: &str,
) -> Result<Response<BoxBody>> {
    let query: HistoryQuery = query_params(&req)?;
    let base = base_url(&req);
    let audits = state
        .audits
        .user_audits(
            user,
            query.status.as_deref(),
            query.date_from.as_deref(),
            query.date_to.as_deref(),
        )
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "audits": audits.iter().map(|a| a.to_json(&base)).collect::<Vec<_>>(),
            "user_email": user,
            "total_count": audits.len(),
        }),
    ))
}

/// GET /audit-summary/{user}
async fn handle_summary(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    user: &str,
) -> Result<Response<BoxBody>> {
    let query: SummaryQuery = query_params(&req)?;
    let summary = state
        .audits
        .audit_summary(user, query.start_date.as_deref(), query.end_date.as_deref())
        .await?;
    Ok(json_response(StatusCode::OK, &summary))
}

/// GET /image/{file_id}. `resize` is accepted and ignored.
async fn handle_image(state: Arc<AppState>, raw_id: &str) -> Result<Response<BoxBody>> {
    let data = state.audits.fetch_image(raw_id).await?;
    Ok(bytes_response(data, "image/jpeg", "public, max-age=86400"))
}

/// Route `/api/school-audit/*` requests
pub async fn handle_audit_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let rest = path.strip_prefix(PREFIX)?;

    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let method = req.method().clone();

    // File ids may contain encoded slashes; take everything after the prefix
    if let Some(raw_id) = rest.strip_prefix("/image/") {
        if method != Method::GET {
            return Some(method_not_allowed());
        }
        return Some(
            handle_image(state, raw_id)
                .await
                .unwrap_or_else(|e| error_response(&e)),
        );
    }

    let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::POST, ["start-audit"]) => handle_start(req, state).await,
        (&Method::POST, ["end-audit"]) => handle_end(req, state).await,
        (&Method::GET, ["current-audit", user]) => {
            handle_current(req, state, &decode_segment(user)).await
        }
        (&Method::GET, ["audits", user]) => handle_history(req, state, &decode_segment(user)).await,
        (&Method::GET, ["audit-summary", user]) => {
            handle_summary(req, state, &decode_segment(user)).await
        }

        (_, ["start-audit"])
        | (_, ["end-audit"])
        | (_, ["current-audit", _])
        | (_, ["audits", _])
        | (_, ["audit-summary", _]) => return Some(method_not_allowed()),

        _ => return Some(not_found("Audit endpoint not found")),
    };

    Some(result.unwrap_or_else(|e| error_response(&e)))
}
