use thiserror::Error;

use crate::{db_types::StatusConversionError, traits::StorageError};

#[derive(Debug, Error)]
pub enum PgDatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Could not interpret a database row. {0}")]
    Conversion(String),
}

impl From<StatusConversionError> for PgDatabaseError {
    fn from(e: StatusConversionError) -> Self {
        PgDatabaseError::Conversion(e.to_string())
    }
}

impl From<PgDatabaseError> for StorageError {
    fn from(e: PgDatabaseError) -> Self {
        StorageError::Database(e.to_string())
    }
}
