//! Warden server binary.
//!
//! Serves the identity provider API and runs the scheduled directory passes
//! in the same process.

mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

use warden_api::AppState;
use warden_api::config::ApiConfig;
use warden_core::auth::{SigningKeys, TokenService};
use warden_core::store::{IdentityStore, PgStore};

const DEFAULT_LOG_FILTER: &str = "info,warden_api=debug,warden_core=debug";

/// CLI arguments. Every option can also come from the environment.
#[derive(Parser, Debug)]
#[command(name = "warden_server", about = "Warden identity provider and directory reconciler")]
pub(crate) struct Args {
    /// Address to bind the HTTP listener.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/warden"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Public base URL; the `iss` of every token.
    #[arg(long, env = "ISSUER", default_value = "http://localhost:3100")]
    issuer: String,

    /// RS256 private key (PKCS#8 or PKCS#1 PEM).
    #[arg(long, env = "SIGNING_KEY_PATH")]
    signing_key: PathBuf,

    /// Mark session cookies `Secure`.
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    secure_cookies: bool,

    /// Bearer secret the chat bot presents on `/internal` routes.
    #[arg(long, env = "INTERNAL_TOKEN")]
    internal_token: Option<String>,

    #[command(flatten)]
    pub(crate) directories: wiring::DirectoryArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    info!(bind_addr = %args.bind_addr, issuer = %args.issuer, "starting warden_server");

    let keys = SigningKeys::from_file(&args.signing_key)?;
    info!(path = %args.signing_key.display(), "signing key loaded");

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    warden_api::migrate(&pool).await?;

    let store: Arc<dyn IdentityStore> = Arc::new(PgStore::new(pool));
    let issuer = args.issuer.trim_end_matches('/').to_string();
    let tokens = Arc::new(TokenService::new(Arc::new(keys), issuer.clone(), store.clone()));

    let config = ApiConfig {
        bind_addr: args.bind_addr.clone(),
        issuer,
        secure_cookies: args.secure_cookies,
        internal_token: args.internal_token.clone().filter(|t| !t.trim().is_empty()),
    };

    let shutdown = CancellationToken::new();
    let wiring::Directories {
        scheduler,
        integrations,
    } = wiring::connect_directories(&args.directories, store.clone(), &shutdown).await?;
    scheduler.start().await;

    let app = warden_api::router(
        AppState::new(tokens, store, config.clone()).with_integrations(integrations),
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    shutdown.cancel();
    scheduler.shutdown().await;
    api_result?;

    Ok(())
}
