//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339 with fixed millisecond precision and a `Z` suffix so that SQL
//! text comparison agrees with chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params, params_from_iter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::attendance::model::{AttendanceEvent, AttendanceEventKind};
use crate::auth::Role;
use crate::error::DatabaseError;
use crate::scheduling::model::{
    Absence, AbsenceKind, Assignment, AssignmentStatus, Member, Project, ProjectStatus,
};
use crate::scheduling::week::WeekWindow;
use crate::store::migrations;
use crate::store::traits::{AssignmentFilter, AuditEntry, OverlapHit, Store};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp encoding: fixed millisecond precision, `Z` suffix.
/// Uniform width keeps lexicographic and chronological order identical.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// `?N, ?N+1, …` placeholder list for a dynamic IN clause.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_member(row: &libsql::Row) -> Result<Member, libsql::Error> {
    let id: String = row.get(0)?;
    let org_id: String = row.get(1)?;
    let role_str: String = row.get(4)?;
    Ok(Member {
        id: parse_uuid(&id),
        org_id: parse_uuid(&org_id),
        name: row.get(2)?,
        email: row.get(3)?,
        role: role_str.parse().unwrap_or(Role::Worker),
        active: row.get::<i64>(5)? != 0,
    })
}

fn row_to_project(row: &libsql::Row) -> Result<Project, libsql::Error> {
    let id: String = row.get(0)?;
    let org_id: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    Ok(Project {
        id: parse_uuid(&id),
        org_id: parse_uuid(&org_id),
        name: row.get(2)?,
        status: status_str.parse().unwrap_or(ProjectStatus::Active),
        address: row.get(4).ok(),
    })
}

fn row_to_assignment(row: &libsql::Row) -> Result<Assignment, libsql::Error> {
    let id: String = row.get(0)?;
    let org_id: String = row.get(1)?;
    let project_id: String = row.get(2)?;
    let user_id: String = row.get(3)?;
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    let status_str: String = row.get(7)?;
    let created_by: String = row.get(11)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;
    Ok(Assignment {
        id: parse_uuid(&id),
        org_id: parse_uuid(&org_id),
        project_id: parse_uuid(&project_id),
        user_id: parse_uuid(&user_id),
        start_ts: parse_datetime(&start_str),
        end_ts: parse_datetime(&end_str),
        all_day: row.get::<i64>(6)? != 0,
        status: status_str.parse().unwrap_or(AssignmentStatus::Planned),
        address: row.get(8).ok(),
        note: row.get(9).ok(),
        sync_to_mobile: row.get::<i64>(10)? != 0,
        created_by: parse_uuid(&created_by),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_absence(row: &libsql::Row) -> Result<Absence, libsql::Error> {
    let id: String = row.get(0)?;
    let org_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    Ok(Absence {
        id: parse_uuid(&id),
        org_id: parse_uuid(&org_id),
        user_id: parse_uuid(&user_id),
        kind: kind_str.parse().unwrap_or(AbsenceKind::Other),
        start_ts: parse_datetime(&start_str),
        end_ts: parse_datetime(&end_str),
        note: row.get(6).ok(),
    })
}

fn row_to_attendance_event(row: &libsql::Row) -> Result<AttendanceEvent, libsql::Error> {
    let id: String = row.get(0)?;
    let assignment_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let event_str: String = row.get(3)?;
    let occurred_str: String = row.get(4)?;
    let recorded_str: String = row.get(5)?;
    Ok(AttendanceEvent {
        id: parse_uuid(&id),
        assignment_id: parse_uuid(&assignment_id),
        user_id: parse_uuid(&user_id),
        event: event_str.parse().unwrap_or(AttendanceEventKind::CheckIn),
        occurred_at: parse_datetime(&occurred_str),
        recorded_at: parse_datetime(&recorded_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const MEMBER_COLUMNS: &str = "id, org_id, name, email, role, active";

const PROJECT_COLUMNS: &str = "id, org_id, name, status, address";

const ASSIGNMENT_COLUMNS: &str = "id, org_id, project_id, user_id, start_ts, end_ts, all_day, \
     status, address, note, sync_to_mobile, created_by, created_at, updated_at";

const ABSENCE_COLUMNS: &str = "id, org_id, user_id, kind, start_ts, end_ts, note";

const ATTENDANCE_COLUMNS: &str = "id, assignment_id, user_id, event, occurred_at, recorded_at";

#[async_trait]
impl Store for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Members ─────────────────────────────────────────────────────

    async fn list_active_members(&self, org_id: Uuid) -> Result<Vec<Member>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM members WHERE org_id = ?1 AND active = 1 ORDER BY name"
                ),
                params![org_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_members: {e}")))?;

        let mut members = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_member(&row) {
                Ok(m) => members.push(m),
                Err(e) => tracing::warn!("Skipping member row: {e}"),
            }
        }
        Ok(members)
    }

    async fn get_member(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Member>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE org_id = ?1 AND id = ?2"),
                params![org_id.to_string(), user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_member: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let member = row_to_member(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_member row parse: {e}")))?;
                Ok(Some(member))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_member: {e}"))),
        }
    }

    async fn insert_member(&self, member: &Member) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO members (id, org_id, name, email, role, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                member.id.to_string(),
                member.org_id.to_string(),
                member.name.clone(),
                member.email.clone(),
                member.role.to_string(),
                member.active as i64,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_member: {e}")))?;
        Ok(())
    }

    // ── Projects ────────────────────────────────────────────────────

    async fn get_project(
        &self,
        org_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE org_id = ?1 AND id = ?2"),
                params![org_id.to_string(), project_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_project: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let project = row_to_project(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_project row parse: {e}")))?;
                Ok(Some(project))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_project: {e}"))),
        }
    }

    async fn list_open_projects(
        &self,
        org_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Project>, DatabaseError> {
        let conn = self.conn();
        let mut sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE org_id = ?1 AND status IN ('active', 'paused')"
        );
        let mut values: Vec<Value> = vec![Value::Text(org_id.to_string())];
        if let Some(pid) = project_id {
            sql.push_str(" AND id = ?2");
            values.push(Value::Text(pid.to_string()));
        }
        sql.push_str(" ORDER BY name");

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("list_open_projects: {e}")))?;

        let mut projects = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_project(&row) {
                Ok(p) => projects.push(p),
                Err(e) => tracing::warn!("Skipping project row: {e}"),
            }
        }
        Ok(projects)
    }

    async fn insert_project(&self, project: &Project) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (id, org_id, name, status, address) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id.to_string(),
                project.org_id.to_string(),
                project.name.clone(),
                project.status.to_string(),
                opt_text(project.address.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_project: {e}")))?;
        Ok(())
    }

    // ── Assignments ─────────────────────────────────────────────────

    async fn insert_assignments(&self, assignments: &[Assignment]) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_assignments begin: {e}")))?;

        for a in assignments {
            tx.execute(
                "INSERT INTO assignments (id, org_id, project_id, user_id, start_ts, end_ts, all_day, status, address, note, sync_to_mobile, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    a.id.to_string(),
                    a.org_id.to_string(),
                    a.project_id.to_string(),
                    a.user_id.to_string(),
                    ts(a.start_ts),
                    ts(a.end_ts),
                    a.all_day as i64,
                    a.status.to_string(),
                    opt_text(a.address.as_deref()),
                    opt_text(a.note.as_deref()),
                    a.sync_to_mobile as i64,
                    a.created_by.to_string(),
                    ts(a.created_at),
                    ts(a.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_assignments: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_assignments commit: {e}")))?;

        debug!(count = assignments.len(), "Assignments inserted");
        Ok(())
    }

    async fn get_assignment(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE org_id = ?1 AND id = ?2"
                ),
                params![org_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_assignment: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let assignment = row_to_assignment(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_assignment row parse: {e}")))?;
                Ok(Some(assignment))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_assignment: {e}"))),
        }
    }

    async fn list_assignments(
        &self,
        org_id: Uuid,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, DatabaseError> {
        let conn = self.conn();
        let mut sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE org_id = ?1");
        let mut values: Vec<Value> = vec![Value::Text(org_id.to_string())];

        if let Some(pid) = filter.project_id {
            values.push(Value::Text(pid.to_string()));
            sql.push_str(&format!(" AND project_id = ?{}", values.len()));
        }
        if let Some(uid) = filter.user_id {
            values.push(Value::Text(uid.to_string()));
            sql.push_str(&format!(" AND user_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(from) = filter.start_from {
            values.push(Value::Text(ts(from)));
            sql.push_str(&format!(" AND start_ts >= ?{}", values.len()));
        }
        if let Some(until) = filter.start_until {
            values.push(Value::Text(ts(until)));
            sql.push_str(&format!(" AND start_ts <= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY start_ts DESC");

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("list_assignments: {e}")))?;

        let mut assignments = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_assignment(&row) {
                Ok(a) => assignments.push(a),
                Err(e) => tracing::warn!("Skipping assignment row: {e}"),
            }
        }
        Ok(assignments)
    }

    async fn list_assignments_starting_in(
        &self,
        org_id: Uuid,
        window: &WeekWindow,
        project_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Assignment>, DatabaseError> {
        let conn = self.conn();
        let mut sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
             WHERE org_id = ?1 AND status != 'cancelled' AND start_ts >= ?2 AND start_ts <= ?3"
        );
        let mut values: Vec<Value> = vec![
            Value::Text(org_id.to_string()),
            Value::Text(ts(window.start)),
            Value::Text(ts(window.end)),
        ];
        if let Some(pid) = project_id {
            values.push(Value::Text(pid.to_string()));
            sql.push_str(&format!(" AND project_id = ?{}", values.len()));
        }
        if let Some(uid) = user_id {
            values.push(Value::Text(uid.to_string()));
            sql.push_str(&format!(" AND user_id = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY start_ts ASC");

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("list_assignments_starting_in: {e}")))?;

        let mut assignments = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_assignment(&row) {
                Ok(a) => assignments.push(a),
                Err(e) => tracing::warn!("Skipping assignment row: {e}"),
            }
        }
        Ok(assignments)
    }

    async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE assignments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), ts(Utc::now()), id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_assignment_status: {e}")))?;

        debug!(assignment_id = %id, status = %status, "Assignment status updated");
        Ok(())
    }

    async fn find_overlapping_assignments(
        &self,
        org_id: Uuid,
        user_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OverlapHit>, DatabaseError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT a.user_id, a.project_id, p.name, a.start_ts, a.end_ts
             FROM assignments a JOIN projects p ON p.id = a.project_id
             WHERE a.org_id = ?1 AND a.status != 'cancelled'
               AND a.start_ts <= ?2 AND a.end_ts >= ?3
               AND a.user_id IN ({})
             ORDER BY a.start_ts ASC",
            placeholders(4, user_ids.len())
        );
        let mut values: Vec<Value> = vec![
            Value::Text(org_id.to_string()),
            Value::Text(ts(end)),
            Value::Text(ts(start)),
        ];
        values.extend(user_ids.iter().map(|id| Value::Text(id.to_string())));

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("find_overlapping_assignments: {e}")))?;

        let mut hits = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let user_id: String = row.get(0).unwrap_or_default();
            let project_id: String = row.get(1).unwrap_or_default();
            let name: String = row.get(2).unwrap_or_default();
            let start_str: String = row.get(3).unwrap_or_default();
            let end_str: String = row.get(4).unwrap_or_default();
            hits.push(OverlapHit {
                user_id: parse_uuid(&user_id),
                project_id: parse_uuid(&project_id),
                project_name: name,
                start_ts: parse_datetime(&start_str),
                end_ts: parse_datetime(&end_str),
            });
        }
        Ok(hits)
    }

    // ── Absences ────────────────────────────────────────────────────

    async fn insert_absence(&self, absence: &Absence) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO absences (id, org_id, user_id, kind, start_ts, end_ts, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                absence.id.to_string(),
                absence.org_id.to_string(),
                absence.user_id.to_string(),
                absence.kind.to_string(),
                ts(absence.start_ts),
                ts(absence.end_ts),
                opt_text(absence.note.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_absence: {e}")))?;
        Ok(())
    }

    async fn find_overlapping_absences(
        &self,
        org_id: Uuid,
        user_ids: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Absence>, DatabaseError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT {ABSENCE_COLUMNS} FROM absences
             WHERE org_id = ?1 AND start_ts <= ?2 AND end_ts >= ?3
               AND user_id IN ({})
             ORDER BY start_ts ASC",
            placeholders(4, user_ids.len())
        );
        let mut values: Vec<Value> = vec![
            Value::Text(org_id.to_string()),
            Value::Text(ts(end)),
            Value::Text(ts(start)),
        ];
        values.extend(user_ids.iter().map(|id| Value::Text(id.to_string())));

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("find_overlapping_absences: {e}")))?;

        let mut absences = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_absence(&row) {
                Ok(a) => absences.push(a),
                Err(e) => tracing::warn!("Skipping absence row: {e}"),
            }
        }
        Ok(absences)
    }

    async fn list_absences_overlapping(
        &self,
        org_id: Uuid,
        window: &WeekWindow,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Absence>, DatabaseError> {
        let conn = self.conn();
        let mut sql = format!(
            "SELECT {ABSENCE_COLUMNS} FROM absences
             WHERE org_id = ?1 AND start_ts <= ?2 AND end_ts >= ?3"
        );
        let mut values: Vec<Value> = vec![
            Value::Text(org_id.to_string()),
            Value::Text(ts(window.end)),
            Value::Text(ts(window.start)),
        ];
        if let Some(uid) = user_id {
            values.push(Value::Text(uid.to_string()));
            sql.push_str(&format!(" AND user_id = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY start_ts ASC");

        let mut rows = conn
            .query(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("list_absences_overlapping: {e}")))?;

        let mut absences = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_absence(&row) {
                Ok(a) => absences.push(a),
                Err(e) => tracing::warn!("Skipping absence row: {e}"),
            }
        }
        Ok(absences)
    }

    // ── Attendance ledger ───────────────────────────────────────────

    async fn insert_attendance_event(
        &self,
        event: &AttendanceEvent,
        bucket: i64,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO attendance_events (id, assignment_id, user_id, event, occurred_at, occurred_bucket, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.to_string(),
                event.assignment_id.to_string(),
                event.user_id.to_string(),
                event.event.to_string(),
                ts(event.occurred_at),
                bucket,
                ts(event.recorded_at),
            ],
        )
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                DatabaseError::Constraint(format!("insert_attendance_event: {msg}"))
            } else {
                DatabaseError::Query(format!("insert_attendance_event: {msg}"))
            }
        })?;

        debug!(event_id = %event.id, event = %event.event, "Attendance event recorded");
        Ok(())
    }

    async fn find_attendance_event_near(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
        kind: AttendanceEventKind,
        occurred_at: DateTime<Utc>,
        tolerance_secs: i64,
    ) -> Result<Option<AttendanceEvent>, DatabaseError> {
        let conn = self.conn();
        let tolerance = chrono::Duration::seconds(tolerance_secs);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ATTENDANCE_COLUMNS} FROM attendance_events
                     WHERE assignment_id = ?1 AND user_id = ?2 AND event = ?3
                       AND occurred_at >= ?4 AND occurred_at <= ?5
                     LIMIT 1"
                ),
                params![
                    assignment_id.to_string(),
                    user_id.to_string(),
                    kind.to_string(),
                    ts(occurred_at - tolerance),
                    ts(occurred_at + tolerance),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_attendance_event_near: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let event = row_to_attendance_event(&row).map_err(|e| {
                    DatabaseError::Query(format!("find_attendance_event_near row parse: {e}"))
                })?;
                Ok(Some(event))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "find_attendance_event_near: {e}"
            ))),
        }
    }

    async fn first_check_in(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT occurred_at FROM attendance_events
                 WHERE assignment_id = ?1 AND user_id = ?2 AND event = 'check_in'
                 ORDER BY occurred_at ASC LIMIT 1",
                params![assignment_id.to_string(), user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("first_check_in: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let occurred: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("first_check_in: {e}")))?;
                Ok(Some(parse_datetime(&occurred)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("first_check_in: {e}"))),
        }
    }

    // ── Audit trail ─────────────────────────────────────────────────

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (id, org_id, user_id, action, entity_type, entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id.to_string(),
                entry.org_id.to_string(),
                entry.user_id.to_string(),
                entry.action.clone(),
                entry.entity_type.clone(),
                entry.entity_id.clone(),
                payload,
                ts(entry.created_at),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_audit: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    async fn seed_project(store: &LibSqlBackend, org: Uuid, name: &str) -> Project {
        let project = Project::new(org, name);
        store.insert_project(&project).await.unwrap();
        project
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("crewplan.db");
        let store = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(store);
    }

    #[tokio::test]
    async fn overlap_bounds_are_inclusive() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let project = seed_project(&store, org, "Bridge").await;

        // Existing assignment 08:00–10:00.
        let existing = Assignment::new(org, project.id, worker, at(8, 0), at(10, 0), Uuid::new_v4());
        store.insert_assignments(&[existing]).await.unwrap();

        // Touching window 10:00–12:00 conflicts under the inclusive rule.
        let hits = store
            .find_overlapping_assignments(org, &[worker], at(10, 0), at(12, 0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].project_name, "Bridge");

        // One second past the boundary does not.
        let hits = store
            .find_overlapping_assignments(
                org,
                &[worker],
                at(10, 0) + chrono::Duration::seconds(1),
                at(12, 0),
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn cancelled_assignments_are_not_overlaps() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let project = seed_project(&store, org, "Bridge").await;

        let assignment =
            Assignment::new(org, project.id, worker, at(8, 0), at(16, 0), Uuid::new_v4());
        let id = assignment.id;
        store.insert_assignments(&[assignment]).await.unwrap();
        store
            .update_assignment_status(id, AssignmentStatus::Cancelled)
            .await
            .unwrap();

        let hits = store
            .find_overlapping_assignments(org, &[worker], at(9, 0), at(11, 0))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn overlap_query_is_batched_across_workers() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let project = seed_project(&store, org, "Tunnel").await;

        let a1 = Assignment::new(org, project.id, u1, at(8, 0), at(12, 0), Uuid::new_v4());
        let a2 = Assignment::new(org, project.id, u2, at(9, 0), at(13, 0), Uuid::new_v4());
        store.insert_assignments(&[a1, a2]).await.unwrap();

        let hits = store
            .find_overlapping_assignments(org, &[u1, u2, u3], at(10, 0), at(11, 0))
            .await
            .unwrap();
        let hit_users: Vec<Uuid> = hits.iter().map(|h| h.user_id).collect();
        assert!(hit_users.contains(&u1));
        assert!(hit_users.contains(&u2));
        assert!(!hit_users.contains(&u3));
    }

    #[tokio::test]
    async fn org_scoping_hides_foreign_rows() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let other_org = Uuid::new_v4();
        let project = seed_project(&store, org, "Depot").await;

        assert!(
            store
                .get_project(other_org, project.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.get_project(org, project.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bulk_insert_lands_all_rows() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let project = seed_project(&store, org, "Depot").await;
        let supervisor = Uuid::new_v4();

        let rows: Vec<Assignment> = (0..5)
            .map(|_| {
                Assignment::new(org, project.id, Uuid::new_v4(), at(8, 0), at(16, 0), supervisor)
            })
            .collect();
        store.insert_assignments(&rows).await.unwrap();

        let listed = store
            .list_assignments(org, &AssignmentFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 5);
    }

    #[tokio::test]
    async fn list_assignments_newest_start_first() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let project = seed_project(&store, org, "Depot").await;

        let early = Assignment::new(org, project.id, worker, at(8, 0), at(10, 0), Uuid::new_v4());
        let late = Assignment::new(org, project.id, worker, at(12, 0), at(14, 0), Uuid::new_v4());
        let late_id = late.id;
        store.insert_assignments(&[early, late]).await.unwrap();

        let listed = store
            .list_assignments(org, &AssignmentFilter::default())
            .await
            .unwrap();
        assert_eq!(listed[0].id, late_id);
    }

    #[tokio::test]
    async fn attendance_replay_bucket_is_a_constraint_error() {
        let store = backend().await;
        let org = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let project = seed_project(&store, org, "Depot").await;
        let assignment =
            Assignment::new(org, project.id, worker, at(8, 0), at(16, 0), Uuid::new_v4());
        let assignment_id = assignment.id;
        store.insert_assignments(&[assignment]).await.unwrap();

        let first = AttendanceEvent::new(
            assignment_id,
            worker,
            AttendanceEventKind::CheckIn,
            at(8, 0),
        );
        store.insert_attendance_event(&first, 100).await.unwrap();

        let replay = AttendanceEvent::new(
            assignment_id,
            worker,
            AttendanceEventKind::CheckIn,
            at(8, 0) + chrono::Duration::seconds(30),
        );
        let err = store.insert_attendance_event(&replay, 100).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn first_check_in_is_the_earliest() {
        let store = backend().await;
        let assignment_id = Uuid::new_v4();
        let worker = Uuid::new_v4();

        let later = AttendanceEvent::new(
            assignment_id,
            worker,
            AttendanceEventKind::CheckIn,
            at(9, 30),
        );
        let earlier = AttendanceEvent::new(
            assignment_id,
            worker,
            AttendanceEventKind::CheckIn,
            at(7, 45),
        );
        store.insert_attendance_event(&later, 1).await.unwrap();
        store.insert_attendance_event(&earlier, 2).await.unwrap();

        let first = store.first_check_in(assignment_id, worker).await.unwrap();
        assert_eq!(first, Some(at(7, 45)));
    }
}
