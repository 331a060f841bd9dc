//! The records that ride the streams between pipeline stages.
//!
//! Errors never cross a stage boundary on their own: they travel embedded in the per-order
//! record so one failing order cannot take down its batch-mates, and so the balance stage can
//! run the compensating transaction for exactly the orders that need it.
use accrual_client::{AccrualApiError, AccrualOrder};
use thiserror::Error;

use crate::{
    db_types::{Order, OrderNumber},
    traits::StorageError,
};

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Fetching the accrual verdict for order {number} failed. {source}")]
    Fetch {
        number: OrderNumber,
        source: AccrualApiError,
    },
    #[error("Storage operation for order {number} failed. {source}")]
    Storage {
        number: OrderNumber,
        source: StorageError,
    },
    #[error("Claiming the next batch failed. {0}")]
    Claim(StorageError),
}

impl PipelineError {
    /// The order this error belongs to, if it belongs to one.
    pub fn order_number(&self) -> Option<&OrderNumber> {
        match self {
            PipelineError::Fetch { number, .. } | PipelineError::Storage { number, .. } => Some(number),
            PipelineError::Claim(_) => None,
        }
    }
}

/// Output of the fetch stage: the external verdict, or the error that stands in for it.
#[derive(Debug, Clone)]
pub struct FetchedOrder {
    pub number: OrderNumber,
    pub verdict: Result<AccrualOrder, PipelineError>,
}

/// Output of the order stage: the persisted order, or the error carried forward for recovery.
#[derive(Debug, Clone)]
pub struct UpdatedOrder {
    pub number: OrderNumber,
    pub result: Result<Order, PipelineError>,
}

/// Terminal record for one order in one tick. The orchestrator forwards the error (if any) to
/// the sink and discards the rest.
#[derive(Debug, Clone)]
pub struct Completion {
    pub number: OrderNumber,
    pub error: Option<PipelineError>,
}
