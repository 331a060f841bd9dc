use std::{env, path::PathBuf, str::FromStr, time::Duration};

use gm_common::Secret;
use gophermart_engine::actualizer::ActualizerConfig;
use log::*;

use crate::errors::AuthError;

const DEFAULT_RUN_ADDRESS: &str = "127.0.0.1:8081";
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_AUTH_COOKIE_NAME: &str = "auth";
const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
const DEFAULT_BATCH_SIZE: i64 = 500;
const DEFAULT_ERROR_BUFFER_SIZE: usize = 1024;
const DEFAULT_HTTP_CLIENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 60;

/// JWT signing configuration. The secret is the base64-encoded HMAC key; the same value signs
/// and verifies, so every replica must share it.
#[derive(Clone)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub secret: Secret<String>,
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, AuthError> {
        let cookie_name =
            env::var("AUTH_COOKIE_NAME").ok().unwrap_or_else(|| DEFAULT_AUTH_COOKIE_NAME.to_string());
        let secret = env::var("AUTH_SECRET_KEY")
            .map_err(|_| AuthError::Initialization("AUTH_SECRET_KEY is not set".to_string()))?;
        if secret.trim().is_empty() {
            return Err(AuthError::Initialization("AUTH_SECRET_KEY is empty".to_string()));
        }
        Ok(Self { cookie_name, secret: Secret::new(secret) })
    }
}

pub struct ServerConfig {
    pub run_address: String,
    pub database_url: String,
    pub migrations_dir: PathBuf,
    /// Base URL of the external accrual service.
    pub accrual_address: String,
    /// Per-request timeout for accrual calls.
    pub http_client_timeout: Duration,
    pub auth: AuthConfig,
    pub actualizer: ActualizerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            run_address: DEFAULT_RUN_ADDRESS.to_string(),
            database_url: String::default(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            accrual_address: String::default(),
            http_client_timeout: Duration::from_secs(DEFAULT_HTTP_CLIENT_TIMEOUT_SECS),
            auth: AuthConfig {
                cookie_name: DEFAULT_AUTH_COOKIE_NAME.to_string(),
                secret: Secret::default(),
            },
            actualizer: ActualizerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from environment variables, falling back to the defaults (with a
    /// logged complaint) when a value does not parse. Durations are given in whole seconds.
    pub fn from_env_or_default() -> Self {
        let run_address = env::var("RUN_ADDRESS").ok().unwrap_or_else(|| DEFAULT_RUN_ADDRESS.to_string());
        let database_url = env::var("DATABASE_URI").ok().unwrap_or_else(|| {
            error!("DATABASE_URI is not set. Please set it to the Postgres connection string.");
            String::default()
        });
        let migrations_dir = PathBuf::from(
            env::var("MIGRATIONS_DIR").ok().unwrap_or_else(|| DEFAULT_MIGRATIONS_DIR.to_string()),
        );
        let accrual_address = env::var("ACCRUAL_SYSTEM_ADDRESS").ok().unwrap_or_else(|| {
            error!("ACCRUAL_SYSTEM_ADDRESS is not set. The balance actualizer cannot run without it.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            error!("Authentication is not configured: {e}");
            AuthConfig { cookie_name: DEFAULT_AUTH_COOKIE_NAME.to_string(), secret: Secret::default() }
        });
        let actualizer = ActualizerConfig {
            tick_interval: Duration::from_secs(env_or("TICK_INTERVAL", DEFAULT_TICK_INTERVAL_SECS)),
            batch_size: env_or("ORDERS_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            fetch_workers: env_or("FETCH_ACCRUAL_WORKERS", DEFAULT_WORKERS),
            order_workers: env_or("UPDATE_ORDERS_WORKERS", DEFAULT_WORKERS),
            balance_workers: env_or("UPDATE_BALANCES_WORKERS", DEFAULT_WORKERS),
            error_buffer_size: env_or("ERROR_BUFFER_SIZE", DEFAULT_ERROR_BUFFER_SIZE),
            lease_timeout: Duration::from_secs(env_or("LEASE_TIMEOUT", DEFAULT_LEASE_TIMEOUT_SECS)),
        };
        Self {
            run_address,
            database_url,
            migrations_dir,
            accrual_address,
            http_client_timeout: Duration::from_secs(env_or(
                "HTTP_CLIENT_TIMEOUT",
                DEFAULT_HTTP_CLIENT_TIMEOUT_SECS,
            )),
            auth,
            actualizer,
        }
    }
}

fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => value.parse::<T>().unwrap_or_else(|e| {
            error!("{value} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
