use std::sync::Arc;

use anyhow::Context;

use docroute::actions::TargetRegistry;
use docroute::api::{AppState, api_routes};
use docroute::config::AppConfig;
use docroute::pipeline::Pipeline;
use docroute::store::{LibSqlTraceStore, MemoryTraceStore, TraceStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("docroute v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}", config.port);
    eprintln!(
        "   Dispatch: max {} retries, backoff unit {:?}, attempt timeout {:?}",
        config.dispatch.max_retries, config.dispatch.backoff_unit, config.dispatch.attempt_timeout
    );

    // ── Trace store ─────────────────────────────────────────────────────
    let trace: Arc<dyn TraceStore> = if config.in_memory_store() {
        eprintln!("   Trace store: in-memory");
        Arc::new(MemoryTraceStore::new())
    } else {
        let store = LibSqlTraceStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open trace database at {}", config.db_path.display()))?;
        eprintln!("   Trace store: {}", config.db_path.display());
        Arc::new(store)
    };

    // ── Pipeline ────────────────────────────────────────────────────────
    let targets = TargetRegistry::simulated(&config.targets);
    let pipeline = Pipeline::new(&config, targets, trace);

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = api_routes(AppState::new(pipeline));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "docroute API started");

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
