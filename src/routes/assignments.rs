//! HTTP routes for school assignments
//!
//! - POST   /api/school-assignment/assign-schools
//! - GET    /api/school-assignment/check-assignment/{trainer}/{date}
//! - GET    /api/school-assignment/today-assignments/{trainer}?date=
//! - GET    /api/school-assignment/today-assignments-with-audit-status/{trainer}?date=
//! - PUT    /api/school-assignment/update-assignment/{id}
//! - DELETE /api/school-assignment/delete-assignment/{id}
//! - POST   /api/school-assignment/sync-audit-status
//! - POST   /api/school-assignment/bulk-assign
//! - GET    /api/school-assignment/trainer-assignments/{trainer}?start_date=&end_date=
//! - GET    /api/school-assignment/controller-assignments/{controller}?date_filter=

use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    base_url, cors_preflight, decode_segment, error_response, json_response, method_not_allowed,
    not_found, parse_json_body, query_params, BoxBody, MAX_JSON_BODY,
};
use crate::reconcile::StatusSummary;
use crate::server::AppState;
use crate::services::assignments::{
    AssignOutcome, AssignRequest, BulkRequest, DateFilter, SyncRequest, UpdateOutcome,
    UpdateRequest,
};
use crate::types::Result;

const PREFIX: &str = "/api/school-assignment";

#[derive(Debug, Default, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    date_filter: Option<String>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /assign-schools
async fn handle_assign(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: AssignRequest = parse_json_body(req, MAX_JSON_BODY).await?;

    let outcome = state.assignments.assign_schools(body, state.args.today()).await?;
    Ok(assign_response(outcome))
}

/// 201 on success, 409 with the existing assignment on conflict
fn assign_response(outcome: AssignOutcome) -> Response<BoxBody> {
    match outcome {
        AssignOutcome::Assigned(result) => json_response(StatusCode::CREATED, &result),
        AssignOutcome::Conflict(existing) => json_response(
            StatusCode::CONFLICT,
            &json!({
                "error": "Trainer already has an assignment for this date",
                "conflict": true,
                "existing_assignment": existing.summary_json(),
            }),
        ),
    }
}

/// GET /check-assignment/{trainer}/{date}
async fn handle_check(state: Arc<AppState>, trainer: &str, date: &str) -> Result<Response<BoxBody>> {
    let body = match state.assignments.check_assignment(trainer, date).await? {
        Some(existing) => json!({ "exists": true, "assignment": existing.summary_json() }),
        None => json!({ "exists": false }),
    };
    Ok(json_response(StatusCode::OK, &body))
}

/// GET /today-assignments/{trainer}
async fn handle_today(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    trainer: &str,
) -> Result<Response<BoxBody>> {
    let query: DateQuery = query_params(&req)?;
    let base = base_url(&req);
    let day = state
        .assignments
        .today_assignments(trainer, query.date.as_deref(), state.args.today())
        .await?;

    let body = match day.found {
        Some((assignment, view)) => json!({
            "assignment": assignment.to_json(),
            "schools": view.schools.iter().map(|s| s.to_json(&base)).collect::<Vec<_>>(),
            "assignment_date": day.assignment_date,
            "summary": view.summary,
            "duplicates_removed": view.duplicates_removed,
        }),
        None => json!({
            "message": "No assignment found for this date",
            "assignment": Value::Null,
            "schools": [],
            "assignment_date": day.assignment_date,
            "summary": StatusSummary::default(),
            "duplicates_removed": 0,
        }),
    };
    Ok(json_response(StatusCode::OK, &body))
}

/// GET /today-assignments-with-audit-status/{trainer}
async fn handle_today_stored(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    trainer: &str,
) -> Result<Response<BoxBody>> {
    let query: DateQuery = query_params(&req)?;
    let view = state
        .assignments
        .today_assignments_with_audit_status(trainer, query.date.as_deref(), state.args.today())
        .await?;

    let mut body = json!({
        "assignment": view.assignment.as_ref().map(|a| a.to_json()),
        "schools": view.schools.iter().map(|s| s.to_json()).collect::<Vec<_>>(),
        "assignment_date": view.assignment_date,
        "summary": view.summary,
        "duplicates_removed": view.duplicates_removed,
    });
    if view.assignment.is_none() {
        body["message"] = json!("No assignment found for this date");
    }
    Ok(json_response(StatusCode::OK, &body))
}

/// PUT /update-assignment/{id}
async fn handle_update(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    id: String,
) -> Result<Response<BoxBody>> {
    let body: UpdateRequest = parse_json_body(req, MAX_JSON_BODY).await?;

    let outcome = state
        .assignments
        .update_assignment(&id, body, state.args.today())
        .await?;
    Ok(update_response(outcome))
}

/// 200 on success, 403 when a past assignment is edited without override
fn update_response(outcome: UpdateOutcome) -> Response<BoxBody> {
    match outcome {
        UpdateOutcome::Updated(result) => json_response(StatusCode::OK, &result),
        UpdateOutcome::PastBlocked { assignment_date } => json_response(
            StatusCode::FORBIDDEN,
            &json!({
                "error": "Cannot edit past assignments",
                "assignment_date": assignment_date,
                "is_past": true,
            }),
        ),
    }
}

/// DELETE /delete-assignment/{id}
async fn handle_delete(state: Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    state.assignments.delete_assignment(id).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": "Assignment deleted successfully", "assignment_id": id }),
    ))
}

/// POST /sync-audit-status
async fn handle_sync(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: SyncRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    let report = state
        .assignments
        .sync_audit_status(body, state.args.today())
        .await?;
    Ok(json_response(StatusCode::OK, &report))
}

/// POST /bulk-assign
async fn handle_bulk(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: BulkRequest = parse_json_body(req, MAX_JSON_BODY).await?;
    let report = state.assignments.bulk_assign(body, state.args.today()).await?;
    Ok(json_response(StatusCode::OK, &report))
}

/// GET /trainer-assignments/{trainer}
async fn handle_trainer_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    trainer: &str,
) -> Result<Response<BoxBody>> {
    let query: RangeQuery = query_params(&req)?;
    let assignments = state
        .assignments
        .trainer_assignments(
            trainer,
            query.start_date.as_deref(),
            query.end_date.as_deref(),
            state.args.today(),
        )
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "trainer_email": trainer,
            "assignments": assignments.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
            "total_count": assignments.len(),
        }),
    ))
}

/// GET /controller-assignments/{controller}
async fn handle_controller_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    controller: &str,
) -> Result<Response<BoxBody>> {
    let query: FilterQuery = query_params(&req)?;
    let filter = match query.date_filter.as_deref() {
        Some(raw) if !raw.is_empty() => raw.parse::<DateFilter>()?,
        _ => DateFilter::default(),
    };

    let rows = state
        .assignments
        .controller_assignments(controller, filter, state.args.today())
        .await?;
    let assignments: Vec<Value> = rows
        .iter()
        .map(|(assignment, trainer_name)| {
            let mut v = assignment.to_json();
            v["trainer_name"] = json!(trainer_name);
            v
        })
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "controller_email": controller,
            "date_filter": filter,
            "total_count": assignments.len(),
            "assignments": assignments,
        }),
    ))
}

// =============================================================================
// Router
// =============================================================================

/// Route `/api/school-assignment/*` requests
pub async fn handle_assignment_request(
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
        (&Method::POST, ["assign-schools"]) => handle_assign(req, state).await,
        (&Method::GET, ["check-assignment", trainer, date]) => {
            handle_check(state, &decode_segment(trainer), &decode_segment(date)).await
        }
        (&Method::GET, ["today-assignments", trainer]) => {
            handle_today(req, state, &decode_segment(trainer)).await
        }
        (&Method::GET, ["today-assignments-with-audit-status", trainer]) => {
            handle_today_stored(req, state, &decode_segment(trainer)).await
        }
        (&Method::PUT, ["update-assignment", id]) => {
            handle_update(req, state, decode_segment(id)).await
        }
        (&Method::DELETE, ["delete-assignment", id]) => {
            handle_delete(state, &decode_segment(id)).await
        }
        (&Method::POST, ["sync-audit-status"]) => handle_sync(req, state).await,
        (&Method::POST, ["bulk-assign"]) => handle_bulk(req, state).await,
        (&Method::GET, ["trainer-assignments", trainer]) => {
            handle_trainer_list(req, state, &decode_segment(trainer)).await
        }
        (&Method::GET, ["controller-assignments", controller]) => {
            handle_controller_list(req, state, &decode_segment(controller)).await
        }

        // Known endpoint, wrong method
        (_, ["assign-schools"])
        | (_, ["check-assignment", _, _])
        | (_, ["today-assignments", _])
        | (_, ["today-assignments-with-audit-status", _])
        | (_, ["update-assignment", _])
        | (_, ["delete-assignment", _])
        | (_, ["sync-audit-status"])
        | (_, ["bulk-assign"])
        | (_, ["trainer-assignments", _])
        | (_, ["controller-assignments", _]) => return Some(method_not_allowed()),

        _ => return Some(not_found("Assignment endpoint not found")),
    };

    Some(result.unwrap_or_else(|e| error_response(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{AssignmentDoc, SchoolEntry};
    use crate::services::assignments::{AssignResult, UpdateResult};
    use http_body_util::BodyExt;

    async fn body_json(resp: Response<BoxBody>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_assign_conflict_is_409_with_existing_assignment() {
        let mut existing = AssignmentDoc::new(
            "c@example.com".into(),
            "t@example.com".into(),
            "2026-10-19".into(),
            vec![SchoolEntry::new("Apex School", "Pune")],
        );
        existing._id = Some(bson::oid::ObjectId::new());

        let resp = assign_response(AssignOutcome::Conflict(existing));
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = body_json(resp).await;
        assert_eq!(body["conflict"], true);
        assert_eq!(body["existing_assignment"]["schools_count"], 1);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_assign_success_is_201() {
        let resp = assign_response(AssignOutcome::Assigned(AssignResult {
            message: "ok".into(),
            assignment_id: "abc".into(),
            assignment_date: "2026-10-19".into(),
            trainer_email: "t@example.com".into(),
            schools_count: 2,
            overwritten: false,
        }));
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["schools_count"], 2);
    }

    #[tokio::test]
    async fn test_past_edit_is_403_and_flagged() {
        let resp = update_response(UpdateOutcome::PastBlocked {
            assignment_date: "2026-10-01".into(),
        });
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body = body_json(resp).await;
        assert_eq!(body["is_past"], true);
        assert_eq!(body["assignment_date"], "2026-10-01");
    }

    #[tokio::test]
    async fn test_update_success_is_200() {
        let resp = update_response(UpdateOutcome::Updated(UpdateResult {
            message: "ok".into(),
            assignment_id: "abc".into(),
            schools_count: 1,
            assignment_date: "2026-10-19".into(),
            is_past_assignment: true,
        }));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["is_past_assignment"], true);
    }
}
