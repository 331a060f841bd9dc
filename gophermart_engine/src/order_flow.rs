use std::sync::Arc;

use gm_common::{is_valid_order_number, Points};
use log::*;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db_types::{BalanceSummary, NewOrderResult, Order, OrderNumber, WithdrawalRecord},
    traits::{AccountManagement, StorageError},
};

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("The order number is not a valid Luhn number")]
    InvalidOrderNumber,
    #[error("The withdrawal sum must be positive")]
    InvalidSum,
    #[error("The balance does not cover the requested withdrawal")]
    NotEnoughBalance,
    #[error("A withdrawal against this order number already exists")]
    AlreadyWithdrawn,
    #[error("The user does not exist")]
    UserNotFound,
    #[error("Database error: {0}")]
    Database(StorageError),
}

impl From<StorageError> for OrderFlowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotEnoughBalance => OrderFlowError::NotEnoughBalance,
            StorageError::AlreadyWithdrawn => OrderFlowError::AlreadyWithdrawn,
            StorageError::UserNotFound => OrderFlowError::UserNotFound,
            other => OrderFlowError::Database(other),
        }
    }
}

/// `OrderFlowApi` is the user-facing API of the engine: everything a logged-in customer can do
/// with orders and balances. Order numbers coming in from the outside world are Luhn-validated
/// here, before they can reach the store or the pipeline.
pub struct OrderFlowApi<B> {
    db: Arc<B>,
}

impl<B> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: Arc::clone(&self.db) }
    }
}

impl<B> OrderFlowApi<B>
where B: AccountManagement
{
    pub fn new(db: Arc<B>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Register an order number for the user. The distinction between "new", "yours already" and
    /// "someone else's" is the storage layer's answer; the HTTP surface maps it onto 202/200/409.
    pub async fn submit_order(&self, user_id: Uuid, number: &str) -> Result<NewOrderResult, OrderFlowError> {
        if !is_valid_order_number(number) {
            return Err(OrderFlowError::InvalidOrderNumber);
        }
        let number = OrderNumber::from(number);
        let result = self.db.save_order_for_user(user_id, &number).await?;
        debug!("🧾️ Order {number} submitted by user {user_id}: {result:?}");
        Ok(result)
    }

    pub async fn orders(&self, user_id: Uuid) -> Result<Vec<Order>, OrderFlowError> {
        let orders = self.db.orders_for_user(user_id).await?;
        Ok(orders)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<BalanceSummary, OrderFlowError> {
        let summary = self.db.balance_for_user(user_id).await?;
        Ok(summary)
    }

    /// Withdraw points against a (future) order number. The number only has to be Luhn-valid; it
    /// does not have to exist as an order.
    pub async fn withdraw(&self, user_id: Uuid, number: &str, sum: Points) -> Result<(), OrderFlowError> {
        if !is_valid_order_number(number) {
            return Err(OrderFlowError::InvalidOrderNumber);
        }
        if sum <= Points::default() {
            return Err(OrderFlowError::InvalidSum);
        }
        let number = OrderNumber::from(number);
        self.db.withdraw(user_id, &number, sum).await?;
        debug!("🧾️ User {user_id} withdrew {sum} against order {number}");
        Ok(())
    }

    pub async fn withdrawals(&self, user_id: Uuid) -> Result<Vec<WithdrawalRecord>, OrderFlowError> {
        let withdrawals = self.db.withdrawals_for_user(user_id).await?;
        Ok(withdrawals)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::traits::MockAccountManagement;

    fn api_with(db: MockAccountManagement) -> OrderFlowApi<MockAccountManagement> {
        OrderFlowApi::new(Arc::new(db))
    }

    #[tokio::test]
    async fn invalid_numbers_never_reach_the_store() {
        let mut db = MockAccountManagement::new();
        db.expect_save_order_for_user().never();
        db.expect_withdraw().never();
        let api = api_with(db);
        let user = Uuid::new_v4();
        let err = api.submit_order(user, "1111111117").await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidOrderNumber));
        let err = api.withdraw(user, "not-a-number", Points::from(10.0)).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidOrderNumber));
    }

    #[tokio::test]
    async fn non_positive_withdrawals_are_rejected() {
        let mut db = MockAccountManagement::new();
        db.expect_withdraw().never();
        let api = api_with(db);
        let err = api.withdraw(Uuid::new_v4(), "3376308833", Points::from(0.0)).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidSum));
    }

    #[tokio::test]
    async fn storage_rejections_map_to_their_own_variants() {
        let mut db = MockAccountManagement::new();
        db.expect_withdraw().returning(|_, _, _| Err(StorageError::NotEnoughBalance));
        let api = api_with(db);
        let err = api.withdraw(Uuid::new_v4(), "3376308833", Points::from(100.6)).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::NotEnoughBalance));
    }

    #[tokio::test]
    async fn submissions_pass_through() {
        let mut db = MockAccountManagement::new();
        db.expect_save_order_for_user().returning(|_, _| Ok(NewOrderResult::Accepted));
        let api = api_with(db);
        let result = api.submit_order(Uuid::new_v4(), "5857088487").await.unwrap();
        assert_eq!(result, NewOrderResult::Accepted);
    }
}
