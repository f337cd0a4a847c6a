//! Configuration types.

use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the HTTP API listens on.
    pub port: u16,
    /// Path to the local database file.
    pub db_path: String,
    /// Window within which a repeated check-in/check-out from the same
    /// worker on the same assignment is treated as a retransmission.
    pub attendance_dedup: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "./data/crewplan.db".to_string(),
            attendance_dedup: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Build a config from `CREWPLAN_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("CREWPLAN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let db_path = std::env::var("CREWPLAN_DB_PATH").unwrap_or(defaults.db_path);

        let attendance_dedup = std::env::var("CREWPLAN_ATTENDANCE_DEDUP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.attendance_dedup);

        Self {
            port,
            db_path,
            attendance_dedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.attendance_dedup, Duration::from_secs(60));
    }
}
