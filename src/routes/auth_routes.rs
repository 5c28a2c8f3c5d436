//! HTTP routes for authentication
//!
//! - POST /api/auth/login          - Check credentials, issue access + refresh tokens
//! - POST /api/auth/register       - Create an account
//! - POST /api/auth/refresh        - Exchange a refresh token for an access token
//! - POST /api/auth/validate-token - Report whether a token is valid
//! - GET  /api/auth/user/{email}   - Public profile

use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use super::{
    cors_preflight, decode_segment, error_response, json_response, method_not_allowed,
    not_found, parse_json_body, BoxBody, MAX_JSON_BODY,
};
use crate::server::AppState;
use crate::services::accounts::{LoginRequest, RefreshRequest, RegisterRequest, ValidateRequest};
use crate::types::Result;

const PREFIX: &str = "/api/auth";

/// POST /login
async fn handle_login(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    let response = state.accounts.login(body).await?;
    Ok(json_response(StatusCode::OK, &response))
}

/// POST /register
async fn handle_register(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: RegisterRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    let response = state.accounts.register(body).await?;
    Ok(json_response(StatusCode::CREATED, &response))
}

/// POST /refresh
async fn handle_refresh(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: RefreshRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    let response = state.accounts.refresh(body)?;
    Ok(json_response(StatusCode::OK, &response))
}

/// POST /validate-token
///
/// Always 200; validity is in the body.
async fn handle_validate(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: ValidateRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    Ok(json_response(StatusCode::OK, &state.accounts.validate_token(body)))
}

/// GET /user/{email}
async fn handle_user(state: Arc<AppState>, email: &str) -> Result<Response<BoxBody>> {
    let user = state.accounts.get_user(email).await?;
    Ok(json_response(StatusCode::OK, &user.profile_json()))
}

/// Route `/api/auth/*` requests
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let rest = path.strip_prefix(PREFIX)?;

    // Handle CORS preflight
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let method = req.method().clone();
    let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::POST, ["login"]) => handle_login(req, state).await,
        (&Method::POST, ["register"]) => handle_register(req, state).await,
        (&Method::POST, ["refresh"]) => handle_refresh(req, state).await,
        (&Method::POST, ["validate-token"]) => handle_validate(req, state).await,
        (&Method::GET, ["user", email]) => handle_user(state, &decode_segment(email)).await,

        // Method not allowed
        (_, ["login"])
        | (_, ["register"])
        | (_, ["refresh"])
        | (_, ["validate-token"])
        | (_, ["user", _]) => return Some(method_not_allowed()),

        // Auth endpoint not found
        _ => return Some(not_found("Auth endpoint not found")),
    };

    Some(result.unwrap_or_else(|e| error_response(&e)))
}
