// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::application::schema_store::SchemaStore;
use crate::application::session_manager::SessionManager;
use crate::infrastructure::config::{StoreKind, load_app_config, load_providers_config};
use crate::infrastructure::file_store::FileSchemaStore;
use crate::infrastructure::memory_store::MemorySchemaStore;
use crate::infrastructure::providers::build_registry;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config()?;
    let providers_config = load_providers_config()?;

    // Create store and provider registry (infrastructure layer)
    let store: Arc<dyn SchemaStore> = match config.store.kind {
        StoreKind::Memory => Arc::new(MemorySchemaStore::new(config.store.code_conflict)),
        StoreKind::File => Arc::new(
            FileSchemaStore::open(&config.store.dir, config.store.code_conflict)
                .await
                .with_context(|| format!("Failed to open schema store at {}", config.store.dir.display()))?,
        ),
    };
    let registry = Arc::new(build_registry(&providers_config)?);
    if registry.is_empty() {
        tracing::warn!("no metric providers registered, every live subscription will fail");
    } else {
        tracing::info!(count = registry.len(), sources = ?registry.sources().collect::<Vec<_>>(), "metric providers ready");
    }

    // Create services (application layer)
    let dashboard_service = DashboardService::new(store);
    let sessions = SessionManager::new(registry.clone(), config.streaming.clone());

    // Create application state
    let state = Arc::new(AppState {
        dashboard_service,
        registry,
        sessions: sessions.clone(),
        provider_timeout: config.streaming.provider_timeout(),
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, store = ?config.store.kind, code_conflict = ?config.store.code_conflict, "screen-live listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(tokio::signal::ctrl_c(), sessions))
        .await?;

    Ok(())
}

/// Resolves once `signal` fires, after cancelling every live session. A
/// signal that cannot be installed never resolves, so the server keeps
/// running.
async fn wait_for_shutdown<F>(signal: F, sessions: SessionManager)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!(open_sessions = sessions.open_sessions(), "shutting down");
    sessions.shutdown();
}
