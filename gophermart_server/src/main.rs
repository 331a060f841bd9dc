use std::env;

use dotenvy::dotenv;
use gophermart_engine::PgDatabase;
use gophermart_server::{
    actualizer_worker::start_actualizer,
    config::{AuthConfig, ServerConfig},
    errors::ServerError,
    server::run_server,
};
use log::{error, info};
use tokio_util::sync::CancellationToken;

const DB_MAX_CONNECTIONS: u32 = 25;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }

    info!("🚀️ Starting server on {}", config.run_address);
    match run(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let db = PgDatabase::new(&config.database_url, &config.migrations_dir, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;

    let cancel = CancellationToken::new();
    let worker = start_actualizer(&config, db.clone(), cancel.clone())?;

    // Actix installs its own signal handling; when the server returns, stop the worker too.
    let result = run_server(config, db).await;
    cancel.cancel();
    let _ = worker.await;
    result
}

fn preflight_check(config: &ServerConfig) -> bool {
    if env::var("SKIP_PREFLIGHT").ok() == Some("Yes".to_string()) {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if AuthConfig::try_from_env().is_err() {
        error!("🚦️ Preflight check FAILED: You must set AUTH_SECRET_KEY before carrying on.");
        result = false;
    }
    if config.database_url.is_empty() {
        error!("🚦️ DATABASE_URI is not set. Please set it to the Postgres connection string.");
        result = false;
    }
    if config.accrual_address.is_empty() {
        error!(
            "🚦️ ACCRUAL_SYSTEM_ADDRESS is not set. Orders would never be actualized. Please point it at the \
             accrual service."
        );
        result = false;
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!("🚦️ If you really know what you're doing, set `SKIP_PREFLIGHT` to `Yes` in your environment.");
    }
    result
}
