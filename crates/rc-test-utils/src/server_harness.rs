//! Test server harness for E2E testing
//!
//! Provides `TestRollCallServer` for spawning real Roll Call instances in tests.

use crate::fixtures::{ADMIN_CHANNEL, ATTENDANCE_CHANNEL};
use metrics_exporter_prometheus::PrometheusBuilder;
use rollcall_service::actors::SessionCoordinator;
use rollcall_service::code::CodeGenerator;
use rollcall_service::config::Config;
use rollcall_service::display::InMemoryBoard;
use rollcall_service::observability::HealthState;
use rollcall_service::routes::{self, AppState};
use rollcall_service::services::AttendanceService;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the Roll Call server in E2E tests.
///
/// Uses the in-memory board as its display surface and a temporary export
/// directory. The metrics recorder is built but never installed globally,
/// so any number of servers can run in one test binary.
pub struct TestRollCallServer {
    addr: SocketAddr,
    pool: SqlitePool,
    config: Config,
    board: Arc<InMemoryBoard>,
    service: Arc<AttendanceService>,
    _export_dir: TempDir,
    _handle: JoinHandle<()>,
}

impl TestRollCallServer {
    /// Spawn a server with a 15 second rotation interval.
    pub async fn spawn(pool: SqlitePool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(pool, HashMap::new()).await
    }

    /// Spawn a server, overriding configuration variables.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    /// * `overrides` - Extra environment-style variables, e.g. `CODE_LENGTH`
    pub async fn spawn_with_vars(
        pool: SqlitePool,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let export_dir = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("Failed to create export dir: {}", e))?;

        let mut vars = HashMap::from([
            (
                "ROLLCALL_ADMIN_CHANNEL_ID".to_string(),
                ADMIN_CHANNEL.to_string(),
            ),
            (
                "ROLLCALL_ATTENDANCE_CHANNEL_ID".to_string(),
                ATTENDANCE_CHANNEL.to_string(),
            ),
            ("DATABASE_URL".to_string(), "sqlite::memory:".to_string()),
            ("ROLLCALL_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "ROLLCALL_EXPORT_DIR".to_string(),
                export_dir.path().display().to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let board = Arc::new(InMemoryBoard::new());
        let (coordinator, _coordinator_task) = SessionCoordinator::spawn(
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
        health.set_ready();

        let state = Arc::new(AppState {
            pool: pool.clone(),
            service: Arc::clone(&service),
            board: Some(Arc::clone(&board)),
            health,
        });

        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            board,
            service,
            _export_dir: export_dir,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The board the server publishes to.
    pub fn board(&self) -> &Arc<InMemoryBoard> {
        &self.board
    }

    /// The service behind the routes, for driving state directly.
    pub fn service(&self) -> &Arc<AttendanceService> {
        &self.service
    }

    /// Directory CSV exports are written to.
    pub fn export_dir(&self) -> &Path {
        &self.config.export_dir
    }
}

impl Drop for TestRollCallServer {
    fn drop(&mut self) {
        self.service.coordinator().cancel();
        self._handle.abort();
    }
}
