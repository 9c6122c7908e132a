// autopilot-server main.rs
// HTTP API for the compliance forecasting and remediation autopilot.

use autopilot_server::{build_router, AppState, Database};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autopilot_server=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let port: u16 = args
        .iter()
        .position(|a| a == "--port" || a == "-p")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            std::env::var("AUTOPILOT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(3000);

    let data_root: Option<std::path::PathBuf> = args
        .iter()
        .position(|a| a == "--data-dir" || a == "-d")
        .and_then(|i| args.get(i + 1))
        .map(std::path::PathBuf::from)
        .or_else(|| {
            std::env::var("AUTOPILOT_DATA_DIR")
                .ok()
                .map(std::path::PathBuf::from)
        });

    let data_dir = data_root.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("compliance-autopilot")
    });
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let db_path = data_dir.join("autopilot.db");
    tracing::info!("📁 Database: {:?}", db_path);
    tracing::info!("📡 Port: {}", port);

    let db = Database::open(&db_path).expect("Failed to open database");
    let state = Arc::new(AppState::new(db));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("🚀 Compliance autopilot running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");
    tracing::info!("Shutting down...");
}
