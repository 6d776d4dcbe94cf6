use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::info;

use campus_checkin::config::CheckinConfig;
use campus_checkin::infra::grpc::{GrpcAttendanceRecorder, GrpcScheduleDirectory};
use campus_checkin::router::build_router;
use campus_checkin::state::AppState;
use campus_checkin::worker::{spawn_relay, spawn_sweeper};
use campus_core::tracing::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = CheckinConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let timeouts = config.grpc_timeouts();
    let recorder = GrpcAttendanceRecorder::lazy(&config.attendance_grpc_url, timeouts)
        .expect("invalid ATTENDANCE_GRPC_URL");
    let schedules = GrpcScheduleDirectory::lazy(&config.schedule_grpc_url, timeouts)
        .expect("invalid SCHEDULE_GRPC_URL");

    let state = AppState {
        db,
        recorder,
        schedules,
        policy: config.policy(),
    };

    // Background workers
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(state.clone(), config.sweep_interval(), shutdown.clone());
    let relay = spawn_relay(state.clone(), config.relay_interval(), shutdown.clone());

    // HTTP server
    let router = build_router(state);
    let http_addr = format!("0.0.0.0:{}", config.checkin_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .expect("failed to bind");

    info!("checkin service listening on {http_addr}");
    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            signal.cancel();
        })
        .await
        .expect("server error");

    shutdown.cancel();
    let _ = tokio::join!(sweeper, relay);
}
