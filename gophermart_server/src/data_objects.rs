use chrono::{DateTime, Utc};
use gophermart_engine::db_types::{Order, OrderStatus, WithdrawalRecord};
use serde::{Deserialize, Serialize};

/// Register/login payload. The same shape serves both endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.number.0,
            status: order.status,
            accrual: order.accrual.map(|p| p.value()),
            uploaded_at: order.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    pub processed_at: DateTime<Utc>,
}

impl From<WithdrawalRecord> for WithdrawalResponse {
    fn from(record: WithdrawalRecord) -> Self {
        Self { order: record.order_number.0, sum: record.sum.value(), processed_at: record.processed_at }
    }
}
