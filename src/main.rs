//! paperscope - arXiv recommendation service
//!
//! HTTP server binary: resolves configuration, wires the upstream
//! clients, and serves the API.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use paperscope::config::Settings;
use paperscope::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting paperscope (arXiv recommendation service)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        cache_dir = %settings.cache_dir.display(),
        cache_enabled = settings.cache_enabled,
        "Cache configuration"
    );
    info!(
        arxiv_query = %settings.arxiv_query,
        max_results = settings.max_results,
        batch_size = settings.batch_size,
        fetch_code_links = settings.fetch_code_links,
        "Pipeline configuration"
    );

    let state = AppState::new(settings)?;
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let app = paperscope::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
