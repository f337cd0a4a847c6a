//! Scheduling data model — assignments, absences, projects, members, conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

/// Lifecycle status of an assignment.
///
/// Transitions are monotonic (`planned → in_progress → done`) except for
/// cancellation, which is driven by supervisor workflows outside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Planned,
    InProgress,
    Done,
    Cancelled,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown assignment status: {s}")),
        }
    }
}

/// A worker's planned commitment to a project for a time span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub all_day: bool,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub sync_to_mobile: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// Create a new planned assignment.
    pub fn new(
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            project_id,
            user_id,
            start_ts,
            end_ts,
            all_day: false,
            status: AssignmentStatus::Planned,
            address: None,
            note: None,
            sync_to_mobile: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: mark as an all-day assignment.
    pub fn all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// Builder: set the job-site address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Builder: set the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Builder: set mobile sync.
    pub fn sync_to_mobile(mut self, sync: bool) -> Self {
        self.sync_to_mobile = sync;
        self
    }
}

/// Kind of declared worker unavailability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceKind {
    Vacation,
    Sick,
    Training,
    Leave,
    Other,
}

impl AbsenceKind {
    /// Human-facing label, as shown in conflict reports and the planning UI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vacation => "Semester",
            Self::Sick => "Sjukdom",
            Self::Training => "Utbildning",
            Self::Leave => "Tjänstledighet",
            Self::Other => "Övrigt",
        }
    }
}

impl std::fmt::Display for AbsenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vacation => write!(f, "vacation"),
            Self::Sick => write!(f, "sick"),
            Self::Training => write!(f, "training"),
            Self::Leave => write!(f, "leave"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for AbsenceKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacation" => Ok(Self::Vacation),
            "sick" => Ok(Self::Sick),
            "training" => Ok(Self::Training),
            "leave" => Ok(Self::Leave),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown absence kind: {s}")),
        }
    }
}

/// A worker's declared unavailability for a time span.
///
/// Read-only input to conflict detection; created and edited by collaborator
/// workflows outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Absence {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub kind: AbsenceKind,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Absence {
    pub fn new(
        org_id: Uuid,
        user_id: Uuid,
        kind: AbsenceKind,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            kind,
            start_ts,
            end_ts,
            note: None,
        }
    }
}

/// Why a proposed assignment is blocked for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Overlaps an existing non-cancelled assignment.
    Overlap,
    /// Overlaps a declared absence.
    Absence,
}

/// A transient conflict report entry. Never persisted; produced only as a
/// response artifact when a proposed assignment cannot be created without
/// an override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Conflicting project names (overlap) or localized absence labels,
    /// comma-joined and deduplicated in occurrence order.
    pub details: String,
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Done,
    Archived,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Done => write!(f, "done"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "done" => Ok(Self::Done),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown project status: {s}")),
        }
    }
}

/// A construction project workers are assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Project {
    pub fn new(org_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name: name.into(),
            status: ProjectStatus::Active,
            address: None,
        }
    }
}

/// An organization member, as listed in the planning view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub org_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub active: bool,
}

impl Member {
    pub fn new(org_id: Uuid, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name: name.into(),
            email: email.into(),
            role,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            AssignmentStatus::Planned,
            AssignmentStatus::InProgress,
            AssignmentStatus::Done,
            AssignmentStatus::Cancelled,
        ] {
            let parsed: AssignmentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn vacation_label_is_semester() {
        assert_eq!(AbsenceKind::Vacation.label(), "Semester");
    }

    #[test]
    fn conflict_serializes_kind_as_type() {
        let conflict = Conflict {
            user_id: Uuid::new_v4(),
            kind: ConflictKind::Absence,
            details: "Semester".to_string(),
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["type"], "absence");
        assert_eq!(json["details"], "Semester");
    }
}
