//! Health check endpoints
//!
//! - /health - Liveness probe, always 200 while the process serves requests
//! - /ready  - Readiness probe, 200 once the persistent store is usable
//! - /version - Build information captured by build.rs
//!
//! Dev mode may run on the in-memory store, which counts as ready there.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// "online" or "degraded"
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    /// "development" or "production"
    pub mode: &'static str,
    pub store: StoreHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct StoreHealth {
    /// "mongodb" or "memory"
    pub documents: &'static str,
    /// "http", "memory" or "unavailable"
    pub blobs: &'static str,
}

fn is_ready(state: &AppState) -> bool {
    state.stores.backend == "mongodb" || state.args.dev_mode
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let ready = is_ready(state);
    let blobs = state.blobs.backend();

    let error = if !ready {
        Some("Document store is not persistent".to_string())
    } else if blobs == "unavailable" {
        Some("Blob storage not configured - photo uploads will be recorded as failed".to_string())
    } else {
        None
    };

    HealthResponse {
        healthy: true,
        status: if ready { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: StoreHealth {
            documents: state.stores.backend,
            blobs,
        },
        error,
    }
}

/// Handle liveness probe (/health)
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// Handle readiness probe (/ready)
pub fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let status = if is_ready(&state) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &build_health_response(&state))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "fieldops",
    };
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::config::Args;
    use crate::store::{MemoryStore, Stores};
    use clap::Parser;

    fn state(dev_mode: bool) -> Arc<AppState> {
        let mut args = Args::parse_from(["fieldops"]);
        args.dev_mode = dev_mode;
        args.jwt_secret = Some("a-test-secret-with-at-least-32-characters".into());
        Arc::new(
            AppState::new(
                args,
                Stores::memory(MemoryStore::new()),
                Arc::new(MemoryBlobStore::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_memory_store_is_ready_only_in_dev_mode() {
        assert_eq!(readiness_check(state(true)).status(), StatusCode::OK);
        assert_eq!(
            readiness_check(state(false)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(health_check(state(false)).status(), StatusCode::OK);
    }

    #[test]
    fn test_version() {
        assert_eq!(version_info().status(), StatusCode::OK);
    }
}
