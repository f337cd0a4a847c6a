//! Attendance data model — the append-only check-in/check-out ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two attendance actions a field worker can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceEventKind {
    CheckIn,
    CheckOut,
}

impl std::fmt::Display for AttendanceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CheckIn => write!(f, "check_in"),
            Self::CheckOut => write!(f, "check_out"),
        }
    }
}

impl std::str::FromStr for AttendanceEventKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_in" => Ok(Self::CheckIn),
            "check_out" => Ok(Self::CheckOut),
            _ => Err(format!("Unknown attendance event: {s}")),
        }
    }
}

/// One immutable ledger entry. Never updated or deleted; the source of
/// truth for worked duration and replay detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub event: AttendanceEventKind,
    /// Client-reported instant of the action.
    pub occurred_at: DateTime<Utc>,
    /// Server-side instant the event was persisted.
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceEvent {
    pub fn new(
        assignment_id: Uuid,
        user_id: Uuid,
        event: AttendanceEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            user_id,
            event,
            occurred_at,
            recorded_at: Utc::now(),
        }
    }
}
