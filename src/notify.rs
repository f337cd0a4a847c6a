//! Notification dispatch — the outbound collaborator seam.
//!
//! Attendance events trigger notifications to project collaborators. The
//! dispatch is fire-and-forget: the recorder spawns it and returns before
//! the outcome is known, and failures are logged, never surfaced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::NotifyError;

/// Payload for a check-in notification.
#[derive(Debug, Clone)]
pub struct CheckInNotice {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub checkin_time: DateTime<Utc>,
}

/// Payload for a check-out notification.
#[derive(Debug, Clone)]
pub struct CheckOutNotice {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub checkout_time: DateTime<Utc>,
    /// Worked duration in fractional hours, derived from the event ledger.
    pub hours_worked: f64,
}

/// Outbound notification channel. Best-effort; no return value is consumed
/// beyond logging the error.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_check_in(&self, notice: CheckInNotice) -> Result<(), NotifyError>;
    async fn notify_check_out(&self, notice: CheckOutNotice) -> Result<(), NotifyError>;
}

/// Dispatcher that records notifications in the log instead of delivering
/// them. Default wiring until a push/email channel is plugged in.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify_check_in(&self, notice: CheckInNotice) -> Result<(), NotifyError> {
        info!(
            project_id = %notice.project_id,
            user_id = %notice.user_id,
            user_name = %notice.user_name,
            checkin_time = %notice.checkin_time,
            "Worker checked in"
        );
        Ok(())
    }

    async fn notify_check_out(&self, notice: CheckOutNotice) -> Result<(), NotifyError> {
        info!(
            project_id = %notice.project_id,
            user_id = %notice.user_id,
            user_name = %notice.user_name,
            checkout_time = %notice.checkout_time,
            hours_worked = notice.hours_worked,
            "Worker checked out"
        );
        Ok(())
    }
}
