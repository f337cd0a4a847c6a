//! Conflict detection — batched overlap checks for proposed assignments.
//!
//! For any number of proposed workers, exactly two store queries are
//! issued: one over existing assignments and one over declared absences.
//! The tests pin the query count, not just the grouping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::scheduling::model::{Conflict, ConflictKind};
use crate::store::Store;

/// Find, per worker, everything that blocks the proposed `[start, end]`
/// window: existing non-cancelled assignments and declared absences.
///
/// Overlap uses inclusive bounds (`existing.start <= end && existing.end >=
/// start`), so a shift ending exactly when the proposal begins still counts.
/// Workers with nothing blocking are omitted from the map entirely.
pub async fn detect_conflicts(
    store: &dyn Store,
    org_id: Uuid,
    worker_ids: &[Uuid],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<HashMap<Uuid, Vec<Conflict>>, DatabaseError> {
    // The two queries have no data dependency; issue them concurrently.
    let (overlaps, absences) = tokio::join!(
        store.find_overlapping_assignments(org_id, worker_ids, start, end),
        store.find_overlapping_absences(org_id, worker_ids, start, end),
    );
    let overlaps = overlaps?;
    let absences = absences?;

    let mut conflicts: HashMap<Uuid, Vec<Conflict>> = HashMap::new();

    // Fold overlap hits into per-worker project-name lists, deduplicated
    // in occurrence order.
    let mut projects_by_worker: HashMap<Uuid, Vec<String>> = HashMap::new();
    for hit in overlaps {
        let names = projects_by_worker.entry(hit.user_id).or_default();
        if !names.contains(&hit.project_name) {
            names.push(hit.project_name);
        }
    }
    for (user_id, names) in projects_by_worker {
        conflicts.entry(user_id).or_default().push(Conflict {
            user_id,
            kind: ConflictKind::Overlap,
            details: names.join(", "),
        });
    }

    // Same fold over absences, keyed by the localized kind label. A worker
    // with both an overlap and an absence gets two distinct entries.
    let mut labels_by_worker: HashMap<Uuid, Vec<&'static str>> = HashMap::new();
    for absence in absences {
        let labels = labels_by_worker.entry(absence.user_id).or_default();
        let label = absence.kind.label();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    for (user_id, labels) in labels_by_worker {
        conflicts.entry(user_id).or_default().push(Conflict {
            user_id,
            kind: ConflictKind::Absence,
            details: labels.join(", "),
        });
    }

    Ok(conflicts)
}
