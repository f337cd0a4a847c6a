//! Assignment creation — validation, conflict gating, bulk insert.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::error::SchedulingError;
use crate::scheduling::conflicts::detect_conflicts;
use crate::scheduling::model::{Assignment, Conflict};
use crate::store::{AuditEntry, Store};

/// A proposed multi-worker assignment.
#[derive(Debug, Clone)]
pub struct NewAssignments {
    pub project_id: Uuid,
    pub user_ids: Vec<Uuid>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub all_day: bool,
    pub address: Option<String>,
    pub note: Option<String>,
    pub sync_to_mobile: bool,
    /// Create despite detected conflicts.
    pub force: bool,
    /// Justification persisted to the audit trail when forcing.
    pub override_comment: Option<String>,
}

/// Result of a create request: ids or a conflict report, never both.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Vec<Uuid>),
    Conflicted(HashMap<Uuid, Vec<Conflict>>),
}

/// Validate, check conflicts (unless overridden), and bulk-insert one
/// assignment per worker.
///
/// All writes happen in a single store call; with conflicts present and no
/// override, nothing is written at all.
pub async fn create_assignments(
    store: &dyn Store,
    session: &Session,
    payload: NewAssignments,
) -> Result<CreateOutcome, SchedulingError> {
    if !session.role.can_schedule() {
        return Err(SchedulingError::Forbidden { role: session.role });
    }
    if payload.user_ids.is_empty() {
        return Err(SchedulingError::Validation {
            field: "user_ids",
            message: "at least one worker is required".to_string(),
        });
    }
    if !payload.all_day && payload.start_ts >= payload.end_ts {
        return Err(SchedulingError::Validation {
            field: "start_ts",
            message: "start must precede end".to_string(),
        });
    }

    let project = store
        .get_project(session.org_id, payload.project_id)
        .await?
        .ok_or(SchedulingError::ProjectNotFound(payload.project_id))?;

    let mut bypassed: HashMap<Uuid, Vec<Conflict>> = HashMap::new();
    if payload.force {
        // Detection still runs (before our own rows land, so they cannot
        // shadow each other) purely to enrich the audit entry. Best-effort.
        if payload.override_comment.is_some() {
            bypassed = detect_conflicts(
                store,
                session.org_id,
                &payload.user_ids,
                payload.start_ts,
                payload.end_ts,
            )
            .await
            .unwrap_or_default();
        }
    } else {
        let conflicts = detect_conflicts(
            store,
            session.org_id,
            &payload.user_ids,
            payload.start_ts,
            payload.end_ts,
        )
        .await?;
        if !conflicts.is_empty() {
            return Ok(CreateOutcome::Conflicted(conflicts));
        }
    }

    let rows: Vec<Assignment> = payload
        .user_ids
        .iter()
        .map(|&user_id| {
            let mut assignment = Assignment::new(
                session.org_id,
                project.id,
                user_id,
                payload.start_ts,
                payload.end_ts,
                session.user_id,
            )
            .all_day(payload.all_day)
            .sync_to_mobile(payload.sync_to_mobile);
            assignment.address = payload.address.clone();
            assignment.note = payload.note.clone();
            assignment
        })
        .collect();

    store.insert_assignments(&rows).await?;
    let created: Vec<Uuid> = rows.iter().map(|a| a.id).collect();

    info!(
        project_id = %project.id,
        workers = created.len(),
        forced = payload.force,
        "Assignments created"
    );

    if payload.force {
        if let Some(comment) = &payload.override_comment {
            let bypassed_flat: Vec<&Conflict> = bypassed.values().flatten().collect();
            let entry = AuditEntry::new(
                session.org_id,
                session.user_id,
                "assignment.force_create",
                "assignment",
                created[0].to_string(),
                serde_json::json!({
                    "created": created,
                    "comment": comment,
                    "bypassed_conflicts": bypassed_flat,
                }),
            );
            if let Err(e) = store.record_audit(&entry).await {
                warn!(error = %e, "Failed to record override audit entry");
            }
        }
    }

    Ok(CreateOutcome::Created(created))
}
