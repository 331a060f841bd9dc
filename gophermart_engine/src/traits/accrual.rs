use accrual_client::{AccrualApi, AccrualApiError, FetchResult};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::db_types::OrderNumber;

/// The pipeline's view of the accrual service. The production implementation is
/// [`accrual_client::AccrualApi`]; tests substitute a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch_verdict(&self, number: &OrderNumber) -> Result<FetchResult, AccrualApiError>;
}

#[async_trait]
impl AccrualSource for AccrualApi {
    async fn fetch_verdict(&self, number: &OrderNumber) -> Result<FetchResult, AccrualApiError> {
        AccrualApi::fetch_verdict(self, number.as_str()).await
    }
}
