use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AccrualApiError {
    #[error("Could not initialize the accrual client. {0}")]
    Initialization(String),
    #[error("Request to the accrual service failed. {0}")]
    Network(String),
    #[error("Could not decode the accrual response body. {0}")]
    InvalidResponse(String),
    #[error("The accrual service answered for order {got} but we asked about {expected}")]
    OrderMismatch { expected: String, got: String },
    #[error("The accrual service replied 429 without a usable Retry-After header. {0}")]
    BadRetryAfter(String),
    #[error("Unexpected HTTP status {status} for order {order}")]
    UnexpectedStatus { status: u16, order: String },
}
