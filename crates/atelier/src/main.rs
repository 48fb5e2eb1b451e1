use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use atelier::artifacts::ArtifactStore;
use atelier::backend::{DiffusionBackend, HttpDiffusionRunner};
use atelier::config::{AtelierConfig, Cli};
use atelier::pipelines::PipelineContext;
use atelier::web;
use axum::http::HeaderName;
use clap::Parser;
use easel::{InMemorySessionStore, McpState, ProxySource};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AtelierConfig::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir).context("Failed to create state directory")?;
    tracing::info!("Using state directory: {}", state_dir.display());

    let store = ArtifactStore::new(&state_dir.join("artifacts"))
        .context("Failed to initialize artifact store")?;

    let backend: Arc<dyn DiffusionBackend> = Arc::new(
        HttpDiffusionRunner::new(
            &config.runner.url,
            Duration::from_secs(config.runner.timeout_secs),
        )
        .context("Failed to build inference runner client")?,
    );
    tracing::info!("Inference runner: {}", config.runner.url);

    let ctx = Arc::new(PipelineContext {
        backend,
        store: store.clone(),
    });
    let mut composite = atelier::build_composite(ctx)?;

    // The sidecar is part of the served namespace; failing to bring it up
    // means the composite must not come up at all.
    let mut sidecar: Option<Arc<ProxySource>> = None;
    if let Some(sidecar_config) = &config.sidecar {
        let proxy = Arc::new(
            ProxySource::spawn(&sidecar_config.command, &sidecar_config.args)
                .await
                .context("Failed to start sidecar tool server")?,
        );
        composite
            .mount(proxy.clone())
            .context("Failed to mount sidecar tool server")?;
        sidecar = Some(proxy);
    }

    let sessions = InMemorySessionStore::new_shared();
    easel::spawn_cleanup_task(
        sessions.clone(),
        Duration::from_secs(60),
        Duration::from_secs(3600),
    );

    let mcp_state = Arc::new(
        McpState::new(Arc::new(composite), "atelier", env!("CARGO_PKG_VERSION"))
            .with_instructions(
                "Image generation tools. Upload input images via POST /artifacts, \
                 pass the returned hash as the image argument, and fetch results \
                 from GET /artifact/{hash}.",
            )
            .with_session_store(sessions),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(easel::SESSION_HEADER)]);

    let app = axum::Router::new()
        .nest("/mcp", easel::streamable_router(mcp_state))
        .merge(web::router(web::WebState { store }))
        .layer(cors);

    let addr = format!("{}:{}", config.bind.host, config.bind.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("atelier listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(proxy) = sidecar {
        tracing::info!("Stopping sidecar tool server");
        let _ = proxy.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
