use std::time::Duration;

use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    db_types::{NewOrderResult, Order, OrderNumber, OrderStatus},
    pg::PgDatabaseError,
};

/// The raw shape of an `orders` row. Status is TEXT in the schema; the conversion into the typed
/// [`Order`] is where a corrupt status value surfaces as an error.
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    status: String,
    accrual: Option<f64>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = PgDatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            number: OrderNumber(row.id),
            status: row.status.parse::<OrderStatus>()?,
            accrual: row.accrual.map(Into::into),
            uploaded_at: row.uploaded_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, PgDatabaseError> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Atomically lease a batch: select up to `limit` rows whose status is in `source`, oldest
/// uploaded first with the order number as a stable tiebreak, move them to `target` and return
/// them. Rows locked by a concurrent claimant are skipped rather than waited on, which is what
/// makes it safe to run several pipeline instances against one database.
pub async fn claim_batch(
    source: &[OrderStatus],
    target: OrderStatus,
    limit: i64,
    conn: &mut PgConnection,
) -> Result<Vec<Order>, PgDatabaseError> {
    if source.is_empty() {
        return Ok(Vec::new());
    }
    let statuses: Vec<String> = source.iter().map(OrderStatus::to_string).collect();
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
            WITH claimable AS (
                SELECT id
                    FROM orders
                    WHERE status = ANY($1)
                    ORDER BY uploaded_at ASC, id ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
            )
            UPDATE orders
                SET status = $3, updated_at = now()
                FROM claimable
                WHERE orders.id = claimable.id
                RETURNING orders.id, orders.status, orders.accrual, orders.uploaded_at;
        "#,
    )
    .bind(&statuses)
    .bind(limit)
    .bind(target.to_string())
    .fetch_all(conn)
    .await?;
    trace!("🛒️ Claimed {} orders for processing", rows.len());
    into_orders(rows)
}

/// Re-lease PROCESSING rows whose lease timestamp is older than `lease_timeout`. The update
/// refreshes `updated_at`, so an actively held lease is never stolen inside the window.
pub async fn reclaim_processing(
    lease_timeout: Duration,
    limit: i64,
    conn: &mut PgConnection,
) -> Result<Vec<Order>, PgDatabaseError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
            WITH stale AS (
                SELECT id
                    FROM orders
                    WHERE status = 'PROCESSING'
                        AND updated_at < now() - ($1 * interval '1 second')
                    ORDER BY uploaded_at ASC, id ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
            )
            UPDATE orders
                SET updated_at = now()
                FROM stale
                WHERE orders.id = stale.id
                RETURNING orders.id, orders.status, orders.accrual, orders.uploaded_at;
        "#,
    )
    .bind(lease_timeout.as_secs_f64())
    .bind(limit)
    .fetch_all(conn)
    .await?;
    if !rows.is_empty() {
        trace!("🛒️ Reclaimed {} stale PROCESSING orders", rows.len());
    }
    into_orders(rows)
}

pub async fn fetch_order(
    number: &OrderNumber,
    conn: &mut PgConnection,
) -> Result<Option<Order>, PgDatabaseError> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT id, status, accrual, uploaded_at FROM orders WHERE id = $1",
    )
    .bind(number.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(Order::try_from).transpose()
}

/// As [`fetch_order`], but takes a row lock so the caller's transaction serializes against
/// concurrent settles of the same order.
pub async fn fetch_order_for_update(
    number: &OrderNumber,
    conn: &mut PgConnection,
) -> Result<Option<Order>, PgDatabaseError> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT id, status, accrual, uploaded_at FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(number.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(Order::try_from).transpose()
}

/// Write an order's status and accrual back. Embed the call in a transaction by passing
/// `&mut *tx`; on its own it is a single atomic statement.
pub async fn update_order(order: &Order, conn: &mut PgConnection) -> Result<(), PgDatabaseError> {
    let _ = sqlx::query(
        "UPDATE orders SET status = $1, accrual = $2, updated_at = now() WHERE id = $3",
    )
    .bind(order.status.to_string())
    .bind(order.accrual.map(|p| p.value()))
    .bind(order.number.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_orders(orders: &[Order], conn: &mut PgConnection) -> Result<(), PgDatabaseError> {
    for order in orders {
        update_order(order, &mut *conn).await?;
    }
    Ok(())
}

pub async fn update_order_status(
    number: &OrderNumber,
    status: OrderStatus,
    conn: &mut PgConnection,
) -> Result<(), PgDatabaseError> {
    let _ = sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status.to_string())
        .bind(number.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Create the order in NEW status and link it to the submitting user, all in one statement.
/// The `ON CONFLICT DO NOTHING` pair plus the trailing select tells us who actually owns the
/// number afterwards, which is all the handler needs for its 200/202/409 decision.
pub async fn insert_order_for_user(
    user_id: Uuid,
    number: &OrderNumber,
    conn: &mut PgConnection,
) -> Result<NewOrderResult, PgDatabaseError> {
    let owner: Option<(Uuid,)> = sqlx::query_as(
        r#"
            WITH ins_order AS (
                INSERT INTO orders (id, status)
                    VALUES ($1, 'NEW')
                    ON CONFLICT (id) DO NOTHING
            ),
            ins_link AS (
                INSERT INTO users_orders (user_id, order_id)
                    VALUES ($2, $1)
                    ON CONFLICT (order_id) DO NOTHING
            )
            SELECT user_id FROM users_orders WHERE order_id = $1;
        "#,
    )
    .bind(number.as_str())
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    let result = match owner {
        // No pre-existing link row: the inserts in the CTEs took effect.
        None => NewOrderResult::Accepted,
        Some((owner_id,)) if owner_id == user_id => NewOrderResult::AlreadyYours,
        Some(_) => NewOrderResult::OwnedByOther,
    };
    Ok(result)
}

pub async fn orders_for_user(user_id: Uuid, conn: &mut PgConnection) -> Result<Vec<Order>, PgDatabaseError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
            SELECT orders.id, orders.status, orders.accrual, orders.uploaded_at
                FROM orders
                    JOIN users_orders ON
                        users_orders.order_id = orders.id
                            AND users_orders.user_id = $1
                ORDER BY orders.uploaded_at DESC;
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    into_orders(rows)
}
