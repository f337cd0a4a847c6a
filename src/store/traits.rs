//! Unified `Store` trait — single async interface for all persistence.
//!
//! Every method is scoped by the caller's organization id where the entity
//! is org-owned; the API layer supplies it from the resolved session, never
//! from request payloads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::attendance::model::{AttendanceEvent, AttendanceEventKind};
use crate::error::DatabaseError;
use crate::scheduling::model::{Absence, Assignment, AssignmentStatus, Member, Project};
use crate::scheduling::week::WeekWindow;

/// Filters for listing assignments.
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    /// Keep assignments starting on/after this instant.
    pub start_from: Option<DateTime<Utc>>,
    /// Keep assignments starting on/before this instant.
    pub start_until: Option<DateTime<Utc>>,
}

/// One row from the batched assignment-overlap query, joined to the
/// conflicting project's name.
#[derive(Debug, Clone)]
pub struct OverlapHit {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

/// An append-only audit trail entry. Writes are best-effort: callers log
/// failures and carry on.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        org_id: Uuid,
        user_id: Uuid,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Backend-agnostic persistence trait covering members, projects,
/// assignments, absences, the attendance ledger, and the audit trail.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Members ─────────────────────────────────────────────────────

    /// All active members of an organization, ordered by name.
    async fn list_active_members(&self, org_id: Uuid) -> Result<Vec<Member>, DatabaseError>;

    /// Look up one member within an organization.
    async fn get_member(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Member>, DatabaseError>;

    async fn insert_member(&self, member: &Member) -> Result<(), DatabaseError>;

    // ── Projects ────────────────────────────────────────────────────

    /// Look up one project within an organization.
    async fn get_project(
        &self,
        org_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, DatabaseError>;

    /// Projects in `active`/`paused` status, optionally narrowed to one id.
    async fn list_open_projects(
        &self,
        org_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Project>, DatabaseError>;

    async fn insert_project(&self, project: &Project) -> Result<(), DatabaseError>;

    // ── Assignments ─────────────────────────────────────────────────

    /// Insert a batch of assignments as one transactional write.
    /// Either every row lands or none do.
    async fn insert_assignments(&self, assignments: &[Assignment]) -> Result<(), DatabaseError>;

    /// Look up one assignment within an organization.
    async fn get_assignment(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Assignment>, DatabaseError>;

    /// List assignments matching the filter, newest start first.
    async fn list_assignments(
        &self,
        org_id: Uuid,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, DatabaseError>;

    /// Non-cancelled assignments whose `start_ts` falls inside the window,
    /// for the planning view.
    async fn list_assignments_starting_in(
        &self,
        org_id: Uuid,
        window: &WeekWindow,
        project_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Assignment>, DatabaseError>;

    async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
    ) -> Result<(), DatabaseError>;

    /// Batched overlap query: every non-cancelled assignment of any of the
    /// given workers whose span touches `[start, end]` (inclusive bounds),
    /// joined to its project name. One query regardless of worker count.
    async fn find_overlapping_assignments(
        &self,
        org_id: Uuid,
        user_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OverlapHit>, DatabaseError>;

    // ── Absences ────────────────────────────────────────────────────

    async fn insert_absence(&self, absence: &Absence) -> Result<(), DatabaseError>;

    /// Batched overlap query over absences, same contract as
    /// [`Store::find_overlapping_assignments`].
    async fn find_overlapping_absences(
        &self,
        org_id: Uuid,
        user_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Absence>, DatabaseError>;

    /// Absences whose span overlaps the window, for the planning view.
    async fn list_absences_overlapping(
        &self,
        org_id: Uuid,
        window: &WeekWindow,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Absence>, DatabaseError>;

    // ── Attendance ledger ───────────────────────────────────────────

    /// Append an event to the ledger. `bucket` is the replay-dedup bucket
    /// (`unix(occurred_at) / dedup_secs`); a [`DatabaseError::Constraint`]
    /// means a concurrent retransmission already landed in the same bucket.
    async fn insert_attendance_event(
        &self,
        event: &AttendanceEvent,
        bucket: i64,
    ) -> Result<(), DatabaseError>;

    /// Find an existing event of the same kind within ±`tolerance_secs`
    /// of `occurred_at`, for replay detection.
    async fn find_attendance_event_near(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
        kind: AttendanceEventKind,
        occurred_at: DateTime<Utc>,
        tolerance_secs: i64,
    ) -> Result<Option<AttendanceEvent>, DatabaseError>;

    /// Earliest check-in recorded for the assignment/worker pair.
    async fn first_check_in(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    // ── Audit trail ─────────────────────────────────────────────────

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DatabaseError>;
}
