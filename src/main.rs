//! tally - sales and subscription analytics API

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::{
    auth::{AccessPolicy, JwtValidator},
    cache::{ReportCache, TransientStore},
    config::Args,
    engine::ReportQueryEngine,
    server::{self, AppState},
    settings::AdminSettings,
    source::{
        schema, DataSourceSelector, DevConfigSource, FileDevConfig, SqliteConnector, SqliteStore,
        StaticDevConfig,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tally={},info", args.log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  tally - shop analytics API");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Primary database: {}", args.primary_db.display());
    info!("Table prefix: {}", args.table_prefix);
    match &args.dev_config {
        Some(path) => info!("Dev config: {}", path.display()),
        None => info!("Dev config: none"),
    }
    info!("Cache duration: {}s", args.cache_duration);
    info!("======================================");

    let primary = SqliteStore::open(&args.primary_db)?;
    if args.init_schema {
        primary.with_conn(|conn| schema::create_store_tables(conn, &args.table_prefix))?;
    }

    let dev_config: Arc<dyn DevConfigSource> = match &args.dev_config {
        Some(path) => Arc::new(FileDevConfig::new(path)),
        None => Arc::new(StaticDevConfig::disabled()),
    };
    let selector = Arc::new(DataSourceSelector::new(
        Arc::new(primary),
        args.table_prefix.clone(),
        dev_config,
        Arc::new(SqliteConnector),
    ));
    if selector.is_dev_mode_enabled() {
        warn!("Dev mode enabled - reports will run against the mirror database");
    }

    let cache = ReportCache::new(Arc::new(TransientStore::new()), &args.cache_config());
    let settings = Arc::new(AdminSettings::new(
        args.cache_duration,
        args.default_range_preset(),
    ));
    let engine = Arc::new(ReportQueryEngine::new(selector, cache, settings));

    let access = if args.insecure_no_auth {
        AccessPolicy::Open
    } else {
        let secret = args.jwt_secret.clone().unwrap_or_default();
        AccessPolicy::Jwt(JwtValidator::new(secret, args.jwt_expiry_seconds)?)
    };

    let state = Arc::new(AppState::new(args, engine, access));
    server::run(state).await?;

    Ok(())
}
