//! EMG analysis server — central HTTP entry point.
//!
//! ## Environment variables
//!
//! | Variable                   | Required | Description                          |
//! |-----------------------------|----------|--------------------------------------|
//! | `DATABASE_URL`              | Yes      | PostgreSQL connection string         |
//! | `BIND_ADDRESS`               | No       | Listen address (default 0.0.0.0:8080)|
//! | `WEBHOOK_SECRET`             | No       | HMAC secret for storage webhooks     |
//! | `OBJECT_STORAGE_BASE_URL`    | Yes      | Base URL to fetch ingested C3D files |
//! | `INGEST_BUCKET`              | No       | Accepted storage bucket name         |
//! | `MAX_FILE_SIZE`              | No       | Max accepted upload size in bytes    |

use clap::Parser;
use ghostly_emg_core::api::{self, AppState, HttpFileSource};
use ghostly_emg_core::{cache::AnalyticsCache, config, session::Orchestrator, store};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "emg-server", about = "Clinical EMG analysis server")]
struct CliArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Bind address (overrides BIND_ADDRESS)
    #[arg(long)]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,emg_server=debug")),
        )
        .init();

    let args = CliArgs::parse();
    let mut cfg = config::EmgConfig::from_env()?;
    if let Some(url) = args.database_url {
        cfg.database_url = url;
    }
    if let Some(addr) = args.bind_address {
        cfg.bind_address = addr;
    }
    if cfg.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL must be set via --database-url or DATABASE_URL env var");
    }

    info!(bind = %cfg.bind_address, "starting EMG analysis server");

    let pool = store::create_pool(&cfg.database_url).await?;
    store::run_migrations(&pool).await?;
    let artifact_store = store::ArtifactStore::new(pool);

    let cache = Arc::new(AnalyticsCache::new(cfg.cache_ttl));
    let file_source = Arc::new(HttpFileSource::new(cfg.object_storage_base_url.clone()));
    let orchestrator = Arc::new(Orchestrator::new(artifact_store.clone(), Arc::clone(&cache), file_source));

    let bind_address = cfg.bind_address.clone();
    config::init(cfg);

    let state = AppState {
        orchestrator,
        store: artifact_store,
        cache,
    };
    let app = api::create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "EMG analysis server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("EMG analysis server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
