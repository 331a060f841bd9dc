use gm_common::Points;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db_types::{BalanceSummary, OrderNumber, WithdrawalRecord},
    pg::PgDatabaseError,
};

/// The user's balance together with the lifetime sum of their withdrawals.
pub async fn balance_summary(
    user_id: Uuid,
    conn: &mut PgConnection,
) -> Result<Option<BalanceSummary>, PgDatabaseError> {
    let row: Option<(f64, f64)> = sqlx::query_as(
        r#"
            SELECT
                users.loyalty_balance,
                COALESCE(SUM(withdrawals.sum), 0)
                FROM users
                    LEFT JOIN users_withdrawals ON
                        users_withdrawals.user_id = users.id
                    LEFT JOIN withdrawals ON
                        withdrawals.order_number = users_withdrawals.withdraw_order_number
                WHERE users.id = $1
                GROUP BY users.id
                LIMIT 1;
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|(current, withdrawn)| BalanceSummary { current: current.into(), withdrawn: withdrawn.into() }))
}

/// Re-read the balance under a row lock. The withdrawal transaction serializes on this.
pub async fn balance_for_update(
    user_id: Uuid,
    conn: &mut PgConnection,
) -> Result<Option<Points>, PgDatabaseError> {
    let row: Option<(f64,)> =
        sqlx::query_as("SELECT loyalty_balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(balance,)| balance.into()))
}

/// Insert the withdrawal row. Returns false when a withdrawal against this order number already
/// exists; the unique constraint is the arbiter.
pub async fn insert_withdrawal(
    number: &OrderNumber,
    sum: Points,
    conn: &mut PgConnection,
) -> Result<bool, PgDatabaseError> {
    let inserted: Option<(String,)> = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (order_number, sum)
                VALUES ($1, $2)
                ON CONFLICT (order_number) DO NOTHING
                RETURNING order_number;
        "#,
    )
    .bind(number.as_str())
    .bind(sum)
    .fetch_optional(conn)
    .await?;
    Ok(inserted.is_some())
}

pub async fn link_withdrawal(
    user_id: Uuid,
    number: &OrderNumber,
    conn: &mut PgConnection,
) -> Result<(), PgDatabaseError> {
    let _ = sqlx::query("INSERT INTO users_withdrawals (user_id, withdraw_order_number) VALUES ($1, $2)")
        .bind(user_id)
        .bind(number.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_balance(user_id: Uuid, balance: Points, conn: &mut PgConnection) -> Result<(), PgDatabaseError> {
    let _ = sqlx::query("UPDATE users SET loyalty_balance = $1 WHERE id = $2")
        .bind(balance)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn withdrawals_for_user(
    user_id: Uuid,
    conn: &mut PgConnection,
) -> Result<Vec<WithdrawalRecord>, PgDatabaseError> {
    let rows = sqlx::query_as::<_, WithdrawalRecord>(
        r#"
            SELECT
                withdrawals.order_number,
                withdrawals.sum,
                withdrawals.processed_at
                FROM withdrawals
                    JOIN users_withdrawals ON
                        users_withdrawals.withdraw_order_number = withdrawals.order_number
                            AND users_withdrawals.user_id = $1
                ORDER BY withdrawals.processed_at DESC;
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
