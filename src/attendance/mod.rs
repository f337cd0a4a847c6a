//! Attendance — the check-in/check-out ledger and state machine.

pub mod model;
pub mod recorder;

pub use recorder::{AttendanceRecorder, CheckRequest, RecordOutcome};
