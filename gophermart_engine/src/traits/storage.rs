use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use gm_common::Points;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::db_types::{BalanceSummary, NewOrderResult, Order, OrderNumber, OrderStatus, User, WithdrawalRecord};

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("A user with this login already exists")]
    UserAlreadyExists,
    #[error("The user does not exist")]
    UserNotFound,
    #[error("The order does not exist")]
    OrderNotFound(OrderNumber),
    #[error("The balance does not cover the requested withdrawal")]
    NotEnoughBalance,
    #[error("A withdrawal against this order number already exists")]
    AlreadyWithdrawn,
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// What the balance stage's settle transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The accrual was credited to this many owning users and the order is now PROCESSED.
    Credited(usize),
    /// The order was not in PROCESSING when re-read under lock, so nothing was credited. This is
    /// how a reclaimed lease avoids applying the same accrual twice.
    Skipped(OrderStatus),
}

/// The reconciliation surface of the store: claim-lease plus the per-stage transactions.
///
/// Each method that mutates state is one atomic transaction; the pipeline composes them but never
/// holds a transaction open across a stage boundary.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PipelineDatabase: Send + Sync {
    /// Atomically select up to `limit` orders whose status is in `source` (oldest uploaded
    /// first, order number as tiebreak), move them to `target` and return them. Rows locked by a
    /// concurrent claimant are skipped, never waited on — this is the serialization point that
    /// keeps two pipeline instances from processing the same order.
    async fn claim_batch(
        &self,
        source: &[OrderStatus],
        target: OrderStatus,
        limit: i64,
    ) -> Result<Vec<Order>, StorageError>;

    /// Re-lease PROCESSING orders whose lease is older than `lease_timeout`. A crash between the
    /// order stage and the balance stage leaves rows parked in PROCESSING; this is how they are
    /// eventually picked up again.
    async fn reclaim_stale(&self, lease_timeout: Duration, limit: i64) -> Result<Vec<Order>, StorageError>;

    /// The order stage's transaction: re-read the order, apply the mapped status and accrual,
    /// commit. Returns the updated order.
    async fn record_verdict(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Points>,
    ) -> Result<Order, StorageError>;

    /// The balance stage's transaction: re-read the order under lock, and if it is still
    /// PROCESSING, credit its accrual to every owning user and mark it PROCESSED. All writes
    /// share the one transaction.
    async fn settle_order(&self, number: &OrderNumber) -> Result<SettleOutcome, StorageError>;

    /// The recovery path: put the order back to NEW so the next tick can retry it.
    async fn release_lease(&self, number: &OrderNumber) -> Result<(), StorageError>;

    /// The owning users of the given orders, with a map from user id to the subset of the input
    /// orders each of them owns.
    async fn users_by_orders(
        &self,
        numbers: &[OrderNumber],
    ) -> Result<(Vec<User>, HashMap<Uuid, Vec<OrderNumber>>), StorageError>;
}

/// The user-account surface of the store, consumed by the HTTP handlers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountManagement: Send + Sync {
    /// Insert a new user with the given (already hashed) credential material.
    /// Fails with [`StorageError::UserAlreadyExists`] when the login is taken.
    async fn create_user(&self, login: &str, pass_hash: &str) -> Result<User, StorageError>;

    async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, StorageError>;

    async fn fetch_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StorageError>;

    /// Register an order number for a user. Creating the order row and linking it to the user is
    /// one atomic statement; resubmissions report who owns the number.
    async fn save_order_for_user(&self, user_id: Uuid, number: &OrderNumber)
        -> Result<NewOrderResult, StorageError>;

    /// The user's orders, most recently uploaded first.
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError>;

    async fn balance_for_user(&self, user_id: Uuid) -> Result<BalanceSummary, StorageError>;

    /// Withdraw `sum` points against an order number. One transaction: re-read the balance under
    /// lock, reject with [`StorageError::NotEnoughBalance`] or [`StorageError::AlreadyWithdrawn`]
    /// as appropriate, insert the withdrawal, link it to the user, debit the balance.
    async fn withdraw(&self, user_id: Uuid, number: &OrderNumber, sum: Points) -> Result<(), StorageError>;

    /// The user's withdrawals, most recently processed first.
    async fn withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<WithdrawalRecord>, StorageError>;
}
