use std::sync::Arc;

use accrual_client::{AccrualApi, AccrualClientConfig};
use gophermart_engine::{actualizer::BalancesActualizer, PgDatabase};
use log::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, errors::ServerError};

/// Starts the balance actualizer worker. Do not await the returned JoinHandle except through the
/// cancellation token, as it runs until cancelled.
pub fn start_actualizer(
    config: &ServerConfig,
    db: PgDatabase,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, ServerError> {
    let client =
        AccrualApi::new(AccrualClientConfig::new(config.accrual_address.clone(), config.http_client_timeout))
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let mut actualizer = BalancesActualizer::new(Arc::new(db), Arc::new(client), config.actualizer.clone());
    actualizer.listen_errors(|e| {
        debug!("🔄️ Error passed out of the balances actualizer: {e}");
    });
    Ok(actualizer.start(cancel))
}
