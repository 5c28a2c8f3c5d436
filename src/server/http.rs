//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per accepted connection.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{extract_token_from_header, JwtValidator, TokenType};
use crate::blob::BlobStore;
use crate::config::Args;
use crate::reconcile::Reconciler;
use crate::routes::{self, cors_preflight, json_response, not_found, BoxBody, ErrorResponse};
use crate::services::{AccountService, AssignmentService, AuditService, MysteryAuditService};
use crate::store::Stores;
use crate::types::{FieldOpsError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub stores: Stores,
    pub blobs: Arc<dyn BlobStore>,
    pub assignments: AssignmentService,
    pub audits: AuditService,
    pub mystery: MysteryAuditService,
    pub accounts: AccountService,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over the given stores
    pub fn new(args: Args, stores: Stores, blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let secret = args.jwt_secret().ok_or_else(|| {
            FieldOpsError::Config("JWT_SECRET is required in production mode".into())
        })?;
        let jwt = Arc::new(JwtValidator::new(
            secret,
            args.jwt_expiry_seconds,
            args.refresh_expiry_seconds,
        )?);

        let reconciler = Reconciler::new(stores.assignments.clone(), stores.audits.clone());
        let assignments = AssignmentService::new(
            reconciler,
            stores.users.clone(),
            args.assignment_window_days,
            args.sync_window_days,
        );
        let audits = AuditService::new(stores.audits.clone(), blobs.clone(), args.timezone());
        let mystery = MysteryAuditService::new(
            stores.mystery.clone(),
            stores.users.clone(),
            blobs.clone(),
            args.timezone(),
        );
        let accounts = AccountService::new(stores.users.clone(), jwt);

        Ok(Self {
            args,
            stores,
            blobs,
            assignments,
            audits,
            mystery,
            accounts,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "fieldops listening on {} (store: {}, blobs: {})",
        state.args.listen,
        state.stores.backend,
        state.blobs.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - authentication disabled");
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
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

fn auth_error(status: StatusCode, error: String, code: &str) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error,
            code: Some(code.into()),
        },
    )
}

/// Enforce the route's minimum role from the bearer token.
/// Dev mode lets everything through.
fn authorize<B>(state: &AppState, req: &Request<B>) -> std::result::Result<(), Response<BoxBody>> {
    let Some(min_role) = crate::auth::required_role(req.method(), req.uri().path()) else {
        return Ok(());
    };
    if state.args.dev_mode {
        return Ok(());
    }

    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(token) = extract_token_from_header(header) else {
        return Err(auth_error(
            StatusCode::UNAUTHORIZED,
            "No token provided".into(),
            "NO_TOKEN",
        ));
    };

    let result = state.accounts.jwt().verify_token(token);
    let claims = match result.claims {
        Some(c) if c.token_type == TokenType::Access => c,
        _ => {
            return Err(auth_error(
                StatusCode::UNAUTHORIZED,
                result.error.unwrap_or_else(|| "Invalid token".into()),
                "INVALID_TOKEN",
            ))
        }
    };

    if claims.role < min_role {
        warn!(
            email = %claims.email,
            role = %claims.role,
            required = %min_role,
            path = %req.uri().path(),
            "Insufficient role"
        );
        return Err(auth_error(
            StatusCode::FORBIDDEN,
            "Insufficient permissions".into(),
            "FORBIDDEN",
        ));
    }

    Ok(())
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    if let Err(response) = authorize(&state, &req) {
        return Ok(response);
    }

    if path.starts_with("/api/auth") {
        return Ok(routes::handle_auth_request(req, state)
            .await
            .unwrap_or_else(|| not_found("Auth endpoint not found")));
    }

    if path.starts_with("/api/school-assignment") {
        return Ok(routes::handle_assignment_request(req, state)
            .await
            .unwrap_or_else(|| not_found("Assignment endpoint not found")));
    }

    if path.starts_with("/api/school-audit") {
        return Ok(routes::handle_audit_request(req, state)
            .await
            .unwrap_or_else(|| not_found("Audit endpoint not found")));
    }

    if path.starts_with("/api/attendance") {
        return Ok(routes::handle_attendance_request(req, state)
            .await
            .unwrap_or_else(|| not_found("Attendance endpoint not found")));
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") => routes::health_check(state),

        // Readiness probe
        (Method::GET, "/ready") => routes::readiness_check(state),

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        _ => not_found("Not Found"),
    };

    Ok(response)
}
