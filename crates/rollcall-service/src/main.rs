//! Roll Call Service
//!
//! Entry point for the rotating-code attendance service.

use rollcall_service::actors::SessionCoordinator;
use rollcall_service::code::CodeGenerator;
use rollcall_service::config::Config;
use rollcall_service::db;
use rollcall_service::display::InMemoryBoard;
use rollcall_service::observability::{init_metrics_recorder, HealthState};
use rollcall_service::routes::{self, AppState};
use rollcall_service::services::AttendanceService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Roll Call service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        admin_channel_id = config.admin_channel_id,
        attendance_channel_id = config.attendance_channel_id,
        bind_address = %config.bind_address,
        rotation_interval_seconds = config.rotation_interval.as_secs(),
        code_length = config.code_length,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let pool = db::connect(&config.database_url).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        e
    })?;
    db::MIGRATOR.run(&pool).await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        e
    })?;
    info!("Database ready");

    let board = Arc::new(InMemoryBoard::new());
    let (coordinator, coordinator_task) = SessionCoordinator::spawn(
        CodeGenerator::new(config.code_length),
        board.clone(),
        config.rotation_interval,
        CancellationToken::new(),
    );

    let service = Arc::new(AttendanceService::new(
        pool.clone(),
        coordinator,
        board.clone(),
        &config,
    ));
    let health = Arc::new(HealthState::new());

    let state = Arc::new(AppState {
        pool,
        service: Arc::clone(&service),
        board: Some(board),
        health: Arc::clone(&health),
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    health.set_ready();
    info!("Roll Call service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // An open session is closed through the normal path so its records
    // are saved before exit.
    health.set_not_ready();
    service.shutdown().await;

    if let Err(e) = coordinator_task.await {
        error!("Coordinator task failed: {}", e);
    }

    info!("Roll Call service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
