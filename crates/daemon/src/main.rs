use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::http::HeaderName;
use forager_core::admission::AdmissionPolicy;
use forager_daemon::catalog::JobCatalog;
use forager_daemon::config::DaemonConfig;
use forager_daemon::engine::snapshot::SnapshotStore;
use forager_daemon::engine::{scheduler, Orchestrator, OrchestratorConfig, ProcessBoundary};
use forager_daemon::ledger::PgLedger;
use forager_daemon::{routes, state::AppState};
use forager_monitor::{ResourceMonitor, SysinfoProbe};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forager_daemon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = DaemonConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_concurrent = config.max_concurrent,
        "Loaded daemon configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = forager_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    forager_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    forager_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Resource monitor ---
    let policy = AdmissionPolicy::new(
        config.min_free_ram_bytes(),
        &config.blocking_processes,
        &config.blocking_cmdline_patterns,
    )
    .expect("Invalid admission policy configuration");

    let monitor = Arc::new(
        ResourceMonitor::new(policy, SysinfoProbe::new())
            .with_poll_interval(config.monitor_interval),
    );

    let monitor_cancel = CancellationToken::new();
    let monitor_handle = Arc::clone(&monitor).watch(
        config.monitor_interval,
        monitor_cancel.clone(),
        |old, new| {
            tracing::info!(old = old.as_str(), new = new.as_str(), "Resource state transition");
        },
    );

    // --- Job catalog ---
    let catalog = JobCatalog::load(&config.jobs_file).expect("Failed to load job catalog");

    // --- Orchestrator ---
    let orchestrator = Orchestrator::new(
        SnapshotStore::new(&config.state_file),
        Arc::clone(&monitor),
        Arc::new(PgLedger::new(pool.clone())),
        Arc::new(ProcessBoundary),
        catalog.clone(),
        OrchestratorConfig {
            max_concurrent: config.max_concurrent,
            tick_interval: config.tick_interval,
            denied_backoff: config.denied_backoff,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        },
    );

    let engine_cancel = CancellationToken::new();
    let engine_handle = tokio::spawn(
        Arc::clone(&orchestrator).run(engine_cancel.clone()),
    );

    // --- Scheduler ---
    let scheduler_handle = scheduler::spawn(
        Arc::clone(&orchestrator),
        &catalog,
        engine_cancel.clone(),
    );

    tracing::info!("Engine started (orchestrator, scheduler, resource monitor)");

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        monitor: Arc::clone(&monitor),
        shutdown: shutdown.clone(),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // The surface is unauthenticated; CORS stays permissive and
        // deployers restrict exposure at the network layer.
        .layer(CorsLayer::permissive())
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting status server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the engine first; the orchestrator flushes its snapshot on exit.
    engine_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;
    tracing::info!("Engine stopped");

    monitor_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), monitor_handle).await;
    tracing::info!("Resource monitoring stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal or a `POST /stop` to initiate graceful
/// shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon shuts
/// down cleanly whether stopped interactively, by a process manager, or
/// over the control surface.
async fn shutdown_signal(stop: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = stop.cancelled() => {
            tracing::info!("Stop requested, starting graceful shutdown");
        }
    }
}
