//! HTTP routes for mystery audits and the field-worker roster
//!
//! - POST /api/attendance/submit
//! - GET  /api/attendance/image_url/{record_id}
//! - GET  /api/attendance/list/{user}?page=&limit=
//! - GET  /api/attendance/stats/{user}
//! - GET  /api/attendance/users?controllerEmail=

use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    base_url, cors_preflight, decode_segment, error_response, json_response, method_not_allowed,
    not_found, parse_json_body, query_params, BoxBody, MAX_AUDIT_BODY,
};
use crate::server::AppState;
use crate::types::Result;

const PREFIX: &str = "/api/attendance";

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RosterQuery {
    #[serde(rename = "controllerEmail")]
    controller_email: Option<String>,
}

/// POST /submit
async fn handle_submit(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let base = base_url(&req);
    let body: Value = parse_json_body(req, MAX_AUDIT_BODY).await?;
    let doc = state.mystery.submit(&body).await?;

    Ok(json_response(
        StatusCode::CREATED,
        &json!({
            "message": format!(
                "Mystery audit submitted successfully with {} staff evaluation(s)",
                doc.staff_count
            ),
            "audit_type": doc.audit_type,
            "record_id": doc.id_hex(),
            "timestamp": doc.timestamp,
            "staff_count": doc.staff_count,
            "cityName": doc.city_name,
            "image_url": doc.image_url(&base),
        }),
    ))
}

/// GET /image_url/{record_id}
async fn handle_image_url(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    record_id: &str,
) -> Result<Response<BoxBody>> {
    let doc = state.mystery.find(record_id).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "record_id": doc.id_hex(),
            "image_url": doc.image_url(&base_url(&req)),
            "user_email": doc.user_email,
            "timestamp": doc.timestamp,
            "audit_type": doc.audit_type,
            "staff_count": doc.staff_count,
        }),
    ))
}

/// GET /list/{user}
async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    user: &str,
) -> Result<Response<BoxBody>> {
    let query: PageQuery = query_params(&req)?;
    let base = base_url(&req);
    let page = state
        .mystery
        .list(user, query.page.as_deref(), query.limit.as_deref())
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "audits": page.audits.iter().map(|a| a.to_json(&base)).collect::<Vec<_>>(),
            "total_count": page.total_count,
            "page": page.page,
            "limit": page.limit,
            "has_more": page.has_more,
        }),
    ))
}

/// GET /stats/{user}
async fn handle_stats(state: Arc<AppState>, user: &str) -> Result<Response<BoxBody>> {
    let stats = state.mystery.stats(user, chrono::Utc::now()).await?;
    Ok(json_response(StatusCode::OK, &stats))
}

/// GET /users?controllerEmail=
async fn handle_users(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let query: RosterQuery = query_params(&req)?;
    let roster = state.mystery.roster(query.controller_email.as_deref()).await?;
    Ok(json_response(StatusCode::OK, &roster))
}

/// Route `/api/attendance/*` requests
pub async fn handle_attendance_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let rest = path.strip_prefix(PREFIX)?;

    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let method = req.method().clone();
    let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::POST, ["submit"]) => handle_submit(req, state).await,
        (&Method::GET, ["image_url", id]) => handle_image_url(req, state, id).await,
        (&Method::GET, ["list", user]) => handle_list(req, state, &decode_segment(user)).await,
        (&Method::GET, ["stats", user]) => handle_stats(state, &decode_segment(user)).await,
        (&Method::GET, ["users"]) => handle_users(req, state).await,

        (_, ["submit"])
        | (_, ["image_url", _])
        | (_, ["list", _])
        | (_, ["stats", _])
        | (_, ["users"]) => return Some(method_not_allowed()),

        _ => return Some(not_found("Attendance endpoint not found")),
    };

    Some(result.unwrap_or_else(|e| error_response(&e)))
}
