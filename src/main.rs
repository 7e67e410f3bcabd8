use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agora::config::{Cli, Config};
use agora::db;
use agora::routes;
use agora::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    if config.is_development() {
        tracing::warn!("Running in development mode; internal error details are exposed");
    }

    // Initialize database
    let db_path = config
        .db_path()
        .ok_or_else(|| anyhow::anyhow!("No database path configured"))?;
    tracing::info!("Database: {}", db_path.display());
    let pool = db::create_pool(db_path)?;
    db::run_migrations(&pool)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::new(pool, config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
