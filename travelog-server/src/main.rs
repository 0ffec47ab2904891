use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use travelog_core::config::{StorageBackend, IMAGEKIT_PRIVATE_KEY_ENV, JWT_SECRET_ENV};
use travelog_core::{
    ImageKitClient, ImageStore, MemoryStoryStore, PgStoryStore, StoryStore, TravelogConfig,
};

use travelog_server::auth::AccessGuard;
use travelog_server::http::{start_http_server, HttpState};
use travelog_server::subsystems::stories::StoryLifecycle;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "travelog.toml")]
    config: String,

    /// Check the record store and exit
    #[arg(long)]
    health: bool,
}

async fn open_store(config: &TravelogConfig) -> anyhow::Result<Arc<dyn StoryStore>> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = travelog_core::db::create_pool(&config.database).await?;
            if config.database.run_migrations {
                travelog_core::db::run_migrations(&pool).await?;
            }
            Ok(Arc::new(PgStoryStore::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory story store; stories are lost on exit");
            Ok(Arc::new(MemoryStoryStore::new()))
        }
    }
}

fn required_env(name: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            eprintln!("Missing required environment variable {}", name);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match TravelogConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let store = match open_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open story store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Story store reachable: {}", v),
            Err(e) => {
                println!("❌ Story store check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Travelog health check passed");
        return Ok(());
    }

    let images: Arc<dyn ImageStore> =
        match ImageKitClient::new(&config.images, required_env(IMAGEKIT_PRIVATE_KEY_ENV)) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("Failed to create image client: {}", e);
                std::process::exit(1);
            }
        };
    let guard = AccessGuard::new(
        required_env(JWT_SECRET_ENV).as_bytes(),
        config.auth.cookie_name.clone(),
    );

    let stories = StoryLifecycle::new(store, images, config.images.placeholder_url.clone());
    let state = Arc::new(HttpState {
        stories,
        guard,
        config,
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
