use async_trait::async_trait;
use gm_common::Points;
use gophermart_engine::{
    db_types::{BalanceSummary, NewOrderResult, Order, OrderNumber, User, WithdrawalRecord},
    traits::{AccountManagement, StorageError},
};
use mockall::mock;
use uuid::Uuid;

mock! {
    pub Accounts {}

    #[async_trait]
    impl AccountManagement for Accounts {
        async fn create_user(&self, login: &str, pass_hash: &str) -> Result<User, StorageError>;
        async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, StorageError>;
        async fn fetch_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StorageError>;
        async fn save_order_for_user(&self, user_id: Uuid, number: &OrderNumber) -> Result<NewOrderResult, StorageError>;
        async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError>;
        async fn balance_for_user(&self, user_id: Uuid) -> Result<BalanceSummary, StorageError>;
        async fn withdraw(&self, user_id: Uuid, number: &OrderNumber, sum: Points) -> Result<(), StorageError>;
        async fn withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<WithdrawalRecord>, StorageError>;
    }
}
