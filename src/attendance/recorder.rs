//! Attendance recording — idempotent check-in/check-out against the
//! assignment state machine.
//!
//! Mobile clients retry aggressively on weak connectivity, so the same
//! event can arrive several times. A replayed event must not create a
//! second ledger entry or double-transition the assignment.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::attendance::model::{AttendanceEvent, AttendanceEventKind};
use crate::auth::Session;
use crate::error::{AttendanceError, DatabaseError};
use crate::notify::{CheckInNotice, CheckOutNotice, NotificationDispatcher};
use crate::scheduling::model::{Assignment, AssignmentStatus};
use crate::store::Store;

/// An incoming check-in/check-out request.
#[derive(Debug, Clone, Copy)]
pub struct CheckRequest {
    pub assignment_id: Uuid,
    pub event: AttendanceEventKind,
    pub ts: DateTime<Utc>,
}

/// What happened to an attendance submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Event appended; `status` is the assignment status after the
    /// transition (possibly unchanged for a no-op pair).
    Recorded { status: AssignmentStatus },
    /// Replay of an already-recorded event; nothing was written.
    Duplicate,
}

/// Records attendance events and advances the assignment state machine.
pub struct AttendanceRecorder {
    store: Arc<dyn Store>,
    notifier: Arc<dyn NotificationDispatcher>,
    dedup_window: Duration,
}

impl AttendanceRecorder {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn NotificationDispatcher>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            dedup_window,
        }
    }

    /// Record one event for the calling worker.
    ///
    /// The assignment must belong to the caller within their org; anything
    /// else reads as not-found. Transitions: `check_in` moves `planned` to
    /// `in_progress`, `check_out` moves `in_progress` to `done`; any other
    /// pair logs the event and leaves the status alone.
    pub async fn record(
        &self,
        session: &Session,
        request: CheckRequest,
    ) -> Result<RecordOutcome, AttendanceError> {
        let assignment = self
            .store
            .get_assignment(session.org_id, request.assignment_id)
            .await?
            .filter(|a| a.user_id == session.user_id)
            .ok_or(AttendanceError::AssignmentNotFound(request.assignment_id))?;

        let dedup_secs = (self.dedup_window.as_secs() as i64).max(1);
        if self
            .store
            .find_attendance_event_near(
                assignment.id,
                session.user_id,
                request.event,
                request.ts,
                dedup_secs,
            )
            .await?
            .is_some()
        {
            debug!(
                assignment_id = %assignment.id,
                event = %request.event,
                "Duplicate attendance event ignored"
            );
            return Ok(RecordOutcome::Duplicate);
        }

        let event = AttendanceEvent::new(assignment.id, session.user_id, request.event, request.ts);
        let bucket = request.ts.timestamp().div_euclid(dedup_secs);
        match self.store.insert_attendance_event(&event, bucket).await {
            Ok(()) => {}
            // A concurrent retransmission won the race to the same bucket.
            Err(DatabaseError::Constraint(_)) => return Ok(RecordOutcome::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let next = match (request.event, assignment.status) {
            (AttendanceEventKind::CheckIn, AssignmentStatus::Planned) => {
                Some(AssignmentStatus::InProgress)
            }
            (AttendanceEventKind::CheckOut, AssignmentStatus::InProgress) => {
                Some(AssignmentStatus::Done)
            }
            _ => None,
        };
        let status = match next {
            Some(next) => {
                self.store
                    .update_assignment_status(assignment.id, next)
                    .await?;
                next
            }
            None => assignment.status,
        };

        self.spawn_notification(&assignment, session.org_id, request);
        Ok(RecordOutcome::Recorded { status })
    }

    /// Dispatch the collaborator notification out-of-band. The request
    /// returns before the outcome is known; failures are logged only.
    fn spawn_notification(&self, assignment: &Assignment, org_id: Uuid, request: CheckRequest) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        let assignment = assignment.clone();

        tokio::spawn(async move {
            let user_name = store
                .get_member(org_id, assignment.user_id)
                .await
                .ok()
                .flatten()
                .map(|m| m.name)
                .unwrap_or_default();

            let result = match request.event {
                AttendanceEventKind::CheckIn => {
                    notifier
                        .notify_check_in(CheckInNotice {
                            project_id: assignment.project_id,
                            user_id: assignment.user_id,
                            user_name,
                            checkin_time: request.ts,
                        })
                        .await
                }
                AttendanceEventKind::CheckOut => {
                    // Worked duration comes from the event ledger, not from
                    // anything the client sent: earliest check-in, falling
                    // back to the planned start when the ledger has a gap.
                    let base = store
                        .first_check_in(assignment.id, assignment.user_id)
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or(assignment.start_ts);
                    let worked = (request.ts - base).max(chrono::Duration::zero());
                    let hours_worked = worked.num_minutes() as f64 / 60.0;

                    notifier
                        .notify_check_out(CheckOutNotice {
                            project_id: assignment.project_id,
                            user_id: assignment.user_id,
                            user_name,
                            checkout_time: request.ts,
                            hours_worked,
                        })
                        .await
                }
            };

            if let Err(e) = result {
                warn!(error = %e, "Attendance notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::auth::Role;
    use crate::error::NotifyError;
    use crate::scheduling::model::{Member, Project};
    use crate::store::LibSqlBackend;

    #[derive(Debug)]
    enum Notice {
        In(CheckInNotice),
        Out(CheckOutNotice),
    }

    /// Dispatcher stub that forwards notices to the test.
    struct CaptureDispatcher {
        tx: mpsc::UnboundedSender<Notice>,
    }

    #[async_trait]
    impl NotificationDispatcher for CaptureDispatcher {
        async fn notify_check_in(&self, notice: CheckInNotice) -> Result<(), NotifyError> {
            let _ = self.tx.send(Notice::In(notice));
            Ok(())
        }
        async fn notify_check_out(&self, notice: CheckOutNotice) -> Result<(), NotifyError> {
            let _ = self.tx.send(Notice::Out(notice));
            Ok(())
        }
    }

    struct Fixture {
        recorder: AttendanceRecorder,
        store: Arc<LibSqlBackend>,
        session: Session,
        assignment_id: Uuid,
        rx: mpsc::UnboundedReceiver<Notice>,
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let org = Uuid::new_v4();

        let worker = Member::new(org, "Maja Lind", "maja@example.com", Role::Worker);
        store.insert_member(&worker).await.unwrap();

        let project = Project::new(org, "Harbour");
        store.insert_project(&project).await.unwrap();

        let assignment =
            Assignment::new(org, project.id, worker.id, at(8, 0), at(16, 0), Uuid::new_v4());
        let assignment_id = assignment.id;
        store.insert_assignments(&[assignment]).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = AttendanceRecorder::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(CaptureDispatcher { tx }),
            Duration::from_secs(60),
        );

        Fixture {
            recorder,
            store,
            session: Session {
                user_id: worker.id,
                org_id: org,
                role: Role::Worker,
            },
            assignment_id,
            rx,
        }
    }

    fn check(assignment_id: Uuid, event: AttendanceEventKind, ts: DateTime<Utc>) -> CheckRequest {
        CheckRequest {
            assignment_id,
            event,
            ts,
        }
    }

    async fn next_notice(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Notice {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification should arrive")
            .expect("channel open")
    }

    #[tokio::test]
    async fn check_in_moves_planned_to_in_progress() {
        let mut f = fixture().await;

        let outcome = f
            .recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                status: AssignmentStatus::InProgress
            }
        );

        let stored = f
            .store
            .get_assignment(f.session.org_id, f.assignment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, AssignmentStatus::InProgress);

        match next_notice(&mut f.rx).await {
            Notice::In(notice) => {
                assert_eq!(notice.user_name, "Maja Lind");
                assert_eq!(notice.checkin_time, at(8, 0));
            }
            other => panic!("expected check-in notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_within_window_is_a_duplicate() {
        let mut f = fixture().await;

        f.recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap();
        let replay = f
            .recorder
            .record(
                &f.session,
                check(
                    f.assignment_id,
                    AttendanceEventKind::CheckIn,
                    at(8, 0) + chrono::Duration::seconds(30),
                ),
            )
            .await
            .unwrap();

        assert_eq!(replay, RecordOutcome::Duplicate);

        // Exactly one transition and one notification.
        let stored = f
            .store
            .get_assignment(f.session.org_id, f.assignment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, AssignmentStatus::InProgress);
        next_notice(&mut f.rx).await;
        assert!(f.rx.try_recv().is_err(), "replay must not notify");
    }

    #[tokio::test]
    async fn same_event_outside_window_is_recorded_again() {
        let f = fixture().await;

        f.recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap();
        let second = f
            .recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 2)),
            )
            .await
            .unwrap();

        // Logged, but in_progress already — a no-op transition.
        assert_eq!(
            second,
            RecordOutcome::Recorded {
                status: AssignmentStatus::InProgress
            }
        );
    }

    #[tokio::test]
    async fn check_out_reports_ledger_derived_hours() {
        let mut f = fixture().await;

        f.recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap();
        next_notice(&mut f.rx).await;

        let outcome = f
            .recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckOut, at(13, 30)),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                status: AssignmentStatus::Done
            }
        );

        match next_notice(&mut f.rx).await {
            Notice::Out(notice) => {
                assert_eq!(notice.hours_worked, 5.5);
                assert_eq!(notice.checkout_time, at(13, 30));
            }
            other => panic!("expected check-out notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_out_without_check_in_falls_back_to_planned_start() {
        let mut f = fixture().await;

        // No prior check-in: status stays planned, duration base is the
        // assignment's own start (08:00).
        let outcome = f
            .recorder
            .record(
                &f.session,
                check(f.assignment_id, AttendanceEventKind::CheckOut, at(12, 0)),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Recorded {
                status: AssignmentStatus::Planned
            }
        );

        match next_notice(&mut f.rx).await {
            Notice::Out(notice) => assert_eq!(notice.hours_worked, 4.0),
            other => panic!("expected check-out notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn someone_elses_assignment_reads_as_not_found() {
        let f = fixture().await;
        let intruder = Session {
            user_id: Uuid::new_v4(),
            org_id: f.session.org_id,
            role: Role::Worker,
        };

        let err = f
            .recorder
            .record(
                &intruder,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::AssignmentNotFound(_)));
    }

    #[tokio::test]
    async fn foreign_org_reads_as_not_found() {
        let f = fixture().await;
        let foreign = Session {
            user_id: f.session.user_id,
            org_id: Uuid::new_v4(),
            role: Role::Worker,
        };

        let err = f
            .recorder
            .record(
                &foreign,
                check(f.assignment_id, AttendanceEventKind::CheckIn, at(8, 0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::AssignmentNotFound(_)));
    }
}
