use std::sync::Arc;

use crewplan::api::{ApiState, api_routes};
use crewplan::attendance::AttendanceRecorder;
use crewplan::auth::{SessionResolver, StaticTokenResolver};
use crewplan::config::AppConfig;
use crewplan::notify::LogDispatcher;
use crewplan::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    eprintln!("🏗  Crewplan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Attendance dedup window: {}s",
        config.attendance_dedup.as_secs()
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }),
    );

    // ── Sessions ─────────────────────────────────────────────────────────
    // Static token table from CREWPLAN_TOKENS; production deployments plug
    // their own resolver in here.
    let sessions: Arc<dyn SessionResolver> = Arc::new(StaticTokenResolver::from_env());

    // ── Attendance ───────────────────────────────────────────────────────
    let recorder = Arc::new(AttendanceRecorder::new(
        Arc::clone(&store),
        Arc::new(LogDispatcher),
        config.attendance_dedup,
    ));

    let app = api_routes(ApiState {
        store,
        sessions,
        recorder,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Crewplan API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
