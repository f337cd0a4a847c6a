//! REST endpoints for assignments, planning, and attendance.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::attendance::model::AttendanceEventKind;
use crate::attendance::{AttendanceRecorder, CheckRequest, RecordOutcome};
use crate::auth::{Session, SessionResolver};
use crate::error::{AttendanceError, SchedulingError};
use crate::scheduling::model::{AssignmentStatus, Conflict};
use crate::scheduling::planning::{self, PlanFilter};
use crate::scheduling::week::resolve_week;
use crate::scheduling::writer::{self, CreateOutcome, NewAssignments};
use crate::store::{AssignmentFilter, Store};

/// Shared state for all API routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<dyn SessionResolver>,
    pub recorder: Arc<AttendanceRecorder>,
}

/// Build the API router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/assignments", get(list_assignments).post(create_assignments))
        .route("/api/planning", get(week_planning))
        .route("/api/attendance", post(record_attendance))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Auth ────────────────────────────────────────────────────────────

/// Resolve the bearer token to a session, or produce the 401 response.
async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<Session, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = match token {
        Some(t) => t,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Missing bearer token"})),
            )
                .into_response());
        }
    };

    match state.sessions.resolve(token).await {
        Some(session) => Ok(session),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid or expired session"})),
        )
            .into_response()),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /api/health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct AssignmentListQuery {
    project_id: Option<Uuid>,
    user_id: Option<Uuid>,
    status: Option<AssignmentStatus>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// GET /api/assignments
///
/// Lists the caller organization's assignments, newest start first.
async fn list_assignments(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<AssignmentListQuery>,
) -> Response {
    let session = match authenticate(&state, &headers).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let filter = AssignmentFilter {
        project_id: query.project_id,
        user_id: query.user_id,
        status: query.status,
        start_from: query
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        start_until: query
            .end_date
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| dt.and_utc()),
    };

    match state.store.list_assignments(session.org_id, &filter).await {
        Ok(assignments) => Json(assignments).into_response(),
        Err(e) => internal_error("list_assignments", e),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CreateAssignmentsRequest {
    project_id: Uuid,
    user_ids: Vec<Uuid>,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default = "default_true")]
    sync_to_mobile: bool,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    override_comment: Option<String>,
}

/// POST /api/assignments
///
/// 201 with the created ids, or 409 with the conflict report.
async fn create_assignments(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateAssignmentsRequest>,
) -> Response {
    let session = match authenticate(&state, &headers).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let payload = NewAssignments {
        project_id: body.project_id,
        user_ids: body.user_ids,
        start_ts: body.start_ts,
        end_ts: body.end_ts,
        all_day: body.all_day,
        address: body.address,
        note: body.note,
        sync_to_mobile: body.sync_to_mobile,
        force: body.force,
        override_comment: body.override_comment,
    };

    match writer::create_assignments(state.store.as_ref(), &session, payload).await {
        Ok(CreateOutcome::Created(created)) => (
            StatusCode::CREATED,
            Json(json!({"created": created, "conflicts": []})),
        )
            .into_response(),
        Ok(CreateOutcome::Conflicted(conflicts)) => {
            let conflicts: Vec<Conflict> = conflicts.into_values().flatten().collect();
            (
                StatusCode::CONFLICT,
                Json(json!({"created": [], "conflicts": conflicts})),
            )
                .into_response()
        }
        Err(SchedulingError::ProjectNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Project not found"})),
        )
            .into_response(),
        Err(SchedulingError::Forbidden { role }) => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": format!("Role {role} may not schedule work")})),
        )
            .into_response(),
        Err(SchedulingError::Validation { field, message }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": message, "field": field})),
        )
            .into_response(),
        Err(SchedulingError::Database(e)) => internal_error("create_assignments", e),
    }
}

#[derive(Debug, Deserialize)]
struct PlanningQuery {
    week: Option<String>,
    project_id: Option<Uuid>,
    user_id: Option<Uuid>,
}

/// GET /api/planning
///
/// The composite weekly view: resources, projects, assignments, absences.
async fn week_planning(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<PlanningQuery>,
) -> Response {
    let session = match authenticate(&state, &headers).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let window = resolve_week(query.week.as_deref(), Utc::now());
    let filter = PlanFilter {
        project_id: query.project_id,
        user_id: query.user_id,
    };

    match planning::week_plan(state.store.as_ref(), session.org_id, window, &filter).await {
        Ok(plan) => Json(plan).into_response(),
        Err(e) => internal_error("week_planning", e),
    }
}

#[derive(Debug, Deserialize)]
struct AttendanceRequest {
    assignment_id: Uuid,
    event: AttendanceEventKind,
    ts: DateTime<Utc>,
}

/// POST /api/attendance
///
/// 201 with the post-transition status; duplicates come back as 200.
async fn record_attendance(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AttendanceRequest>,
) -> Response {
    let session = match authenticate(&state, &headers).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let request = CheckRequest {
        assignment_id: body.assignment_id,
        event: body.event,
        ts: body.ts,
    };

    match state.recorder.record(&session, request).await {
        Ok(RecordOutcome::Recorded { status }) => (
            StatusCode::CREATED,
            Json(json!({"success": true, "status": status})),
        )
            .into_response(),
        Ok(RecordOutcome::Duplicate) => (
            StatusCode::OK,
            Json(json!({"success": true, "message": "already recorded"})),
        )
            .into_response(),
        Err(AttendanceError::AssignmentNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Assignment not found"})),
        )
            .into_response(),
        Err(AttendanceError::Database(e)) => internal_error("record_attendance", e),
    }
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, context, "Store failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal error"})),
    )
        .into_response()
}
