//! `PgDatabase` is the concrete Postgres backend for the gophermart engine.
//!
//! It owns the connection pool and composes the low-level query functions from the sibling
//! modules into the transactions the traits promise. One logical transaction per caller; the
//! pool is safe to share across all pipeline workers and HTTP handlers.
use std::{collections::HashMap, fmt::Debug, path::Path, time::Duration};

use async_trait::async_trait;
use gm_common::Points;
use log::*;
use sqlx::{migrate::Migrator, PgPool};
use uuid::Uuid;

use crate::{
    db_types::{BalanceSummary, NewOrderResult, Order, OrderNumber, OrderStatus, User, WithdrawalRecord},
    pg::{new_pool, orders, users, withdrawals},
    traits::{AccountManagement, PipelineDatabase, SettleOutcome, StorageError},
};

#[derive(Clone)]
pub struct PgDatabase {
    url: String,
    pool: PgPool,
}

impl Debug for PgDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PgDatabase ({:?})", self.pool)
    }
}

impl PgDatabase {
    /// Connect to the database and bring the schema up to date from the given migrations
    /// directory.
    pub async fn new(url: &str, migrations_dir: &Path, max_connections: u32) -> Result<Self, StorageError> {
        let pool = new_pool(url, max_connections).await?;
        let migrator = Migrator::new(migrations_dir)
            .await
            .map_err(|e| StorageError::Database(format!("Could not load migrations: {e}")))?;
        migrator.run(&pool).await.map_err(|e| StorageError::Database(format!("Migration failed: {e}")))?;
        info!("🗄️ Database schema is up to date");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineDatabase for PgDatabase {
    async fn claim_batch(
        &self,
        source: &[OrderStatus],
        target: OrderStatus,
        limit: i64,
    ) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let claimed = orders::claim_batch(source, target, limit, &mut conn).await?;
        Ok(claimed)
    }

    async fn reclaim_stale(&self, lease_timeout: Duration, limit: i64) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let reclaimed = orders::reclaim_processing(lease_timeout, limit, &mut conn).await?;
        Ok(reclaimed)
    }

    async fn record_verdict(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Points>,
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(number, &mut tx)
            .await?
            .ok_or_else(|| StorageError::OrderNotFound(number.clone()))?;
        let updated = Order { status, accrual, ..order };
        orders::update_order(&updated, &mut tx).await?;
        tx.commit().await?;
        trace!("🗄️ Recorded verdict {status} for order {number}");
        Ok(updated)
    }

    async fn settle_order(&self, number: &OrderNumber) -> Result<SettleOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_for_update(number, &mut tx)
            .await?
            .ok_or_else(|| StorageError::OrderNotFound(number.clone()))?;
        // The terminal check under lock is what makes the credit apply exactly once, no matter
        // how many times a reclaimed lease sends the order back through here.
        if order.status != OrderStatus::Processing {
            tx.rollback().await?;
            return Ok(SettleOutcome::Skipped(order.status));
        }
        let accrual = order.accrual.unwrap_or_default();
        let (mut owners, _) = users::users_by_orders(std::slice::from_ref(number), &mut tx).await?;
        for owner in &mut owners {
            owner.balance += accrual;
        }
        users::update_users(&owners, &mut tx).await?;
        let settled = Order { status: OrderStatus::Processed, ..order };
        orders::update_order(&settled, &mut tx).await?;
        tx.commit().await?;
        debug!("🗄️ Order {number} settled: {accrual} credited to {} user(s)", owners.len());
        Ok(SettleOutcome::Credited(owners.len()))
    }

    async fn release_lease(&self, number: &OrderNumber) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(number, OrderStatus::New, &mut conn).await?;
        debug!("🗄️ Order {number} released back to NEW");
        Ok(())
    }

    async fn users_by_orders(
        &self,
        numbers: &[OrderNumber],
    ) -> Result<(Vec<User>, HashMap<Uuid, Vec<OrderNumber>>), StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = users::users_by_orders(numbers, &mut conn).await?;
        Ok(result)
    }
}

#[async_trait]
impl AccountManagement for PgDatabase {
    async fn create_user(&self, login: &str, pass_hash: &str) -> Result<User, StorageError> {
        let mut conn = self.pool.acquire().await?;
        users::create_user(login, pass_hash, &mut conn).await?.ok_or(StorageError::UserAlreadyExists)
    }

    async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_login(login, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_id(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn save_order_for_user(
        &self,
        user_id: Uuid,
        number: &OrderNumber,
    ) -> Result<NewOrderResult, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::insert_order_for_user(user_id, number, &mut conn).await?;
        Ok(result)
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let list = orders::orders_for_user(user_id, &mut conn).await?;
        Ok(list)
    }

    async fn balance_for_user(&self, user_id: Uuid) -> Result<BalanceSummary, StorageError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::balance_summary(user_id, &mut conn).await?.ok_or(StorageError::UserNotFound)
    }

    async fn withdraw(&self, user_id: Uuid, number: &OrderNumber, sum: Points) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let balance =
            withdrawals::balance_for_update(user_id, &mut tx).await?.ok_or(StorageError::UserNotFound)?;
        if balance < sum {
            tx.rollback().await?;
            return Err(StorageError::NotEnoughBalance);
        }
        if !withdrawals::insert_withdrawal(number, sum, &mut tx).await? {
            tx.rollback().await?;
            return Err(StorageError::AlreadyWithdrawn);
        }
        withdrawals::link_withdrawal(user_id, number, &mut tx).await?;
        withdrawals::set_balance(user_id, balance - sum, &mut tx).await?;
        tx.commit().await?;
        debug!("🗄️ Withdrew {sum} against order {number} for user {user_id}");
        Ok(())
    }

    async fn withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<WithdrawalRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let list = withdrawals::withdrawals_for_user(user_id, &mut conn).await?;
        Ok(list)
    }
}
