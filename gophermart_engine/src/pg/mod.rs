//! # Postgres backend
//!
//! This module contains the "low-level" Postgres interactions.
//!
//! All of these are simple functions (rather than stateful structs) that accept a
//! `&mut PgConnection` argument. Callers can obtain a connection from a pool, or open a
//! transaction as the need arises and pass `&mut *tx` without any other changes. The transaction
//! composition itself lives in [`db::PgDatabase`].
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, PgPool};

pub mod db;
mod errors;
mod orders;
mod users;
mod withdrawals;

pub use errors::PgDatabaseError;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<PgPool, SqlxError> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
