//! Error types for Crewplan.

use uuid::Uuid;

use crate::auth::Role;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("Attendance error: {0}")]
    Attendance(#[from] AttendanceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from assignment planning and creation.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// The project does not exist within the caller's organization.
    /// Deliberately indistinguishable from "exists in another org".
    #[error("Project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("Role {role} may not schedule work")]
    Forbidden { role: Role },

    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors from attendance recording.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// The assignment does not exist for the caller within their org.
    #[error("Assignment {0} not found")]
    AssignmentNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Notification dispatch errors. Always caught and logged, never propagated
/// to the request that triggered the notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
