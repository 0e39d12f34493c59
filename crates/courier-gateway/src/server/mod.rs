//! Server setup and initialization

mod middleware;
mod state;

pub use middleware::REQUEST_ID_HEADER;
pub use state::GatewayState;

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use courier_common::{AppConfig, AppError, AppResult};
use courier_core::SessionRepository;
use courier_db::{create_pool, MemorySessionRepository, PgSessionRepository};

use crate::api::{create_router, health_routes};
use crate::client::{MemoryClientFactory, MemoryCredentialStore};
use crate::session::SessionManagerBuilder;
use crate::webhook::HttpWebhookNotifier;

use middleware::apply_middleware;

/// Build the complete application with all routes and middleware
pub fn create_app(state: GatewayState) -> Router {
    let router = create_router().merge(health_routes());
    apply_middleware(router).with_state(state)
}

/// Initialize all dependencies and create `GatewayState`
///
/// Persists to PostgreSQL when `DATABASE_URL` is set, in memory otherwise.
pub async fn create_gateway_state(config: AppConfig) -> AppResult<GatewayState> {
    let repository: Arc<dyn SessionRepository> = match &config.database {
        Some(database) => {
            info!("Connecting to PostgreSQL...");
            let pool = create_pool(&courier_db::DatabaseConfig::from(database))
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            let repository = PgSessionRepository::new(pool);
            repository.ensure_schema().await?;
            info!("PostgreSQL connection established");
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL not set, sessions are kept in memory only");
            Arc::new(MemorySessionRepository::new())
        }
    };

    let notifier = HttpWebhookNotifier::new(&config.webhook).map_err(AppError::internal)?;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let factory = Arc::new(MemoryClientFactory::new(Arc::clone(&credentials)));

    let sessions = SessionManagerBuilder::new(factory, credentials, repository, Arc::new(notifier))
        .with_config(&config)
        .build();

    let restore = config.session.restore_on_startup;
    let state = GatewayState::new(sessions, config);

    if restore {
        state.sessions().restore_all(&state.request_token()).await?;
    }

    Ok(state)
}

/// Serve `app` on `listener` until a shutdown signal, then stop the sessions
pub async fn run_server(
    listener: TcpListener,
    app: Router,
    state: GatewayState,
) -> AppResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server listening on http://{}", addr);
    }

    let shutdown = state.shutdown().clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown_signal() => shutdown.cancel(),
                () = shutdown.cancelled() => {}
            }
        })
        .await
        .map_err(|e| AppError::Config(format!("Server error: {}", e)))?;

    state.sessions().shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Run the complete server with configuration
pub async fn run(config: AppConfig) -> AppResult<()> {
    let addr = config.gateway.address();
    let state = create_gateway_state(config).await?;
    let app = create_app(state.clone());

    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    run_server(listener, app, state).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
