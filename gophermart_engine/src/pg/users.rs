use std::collections::HashMap;

use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    db_types::{OrderNumber, User},
    pg::PgDatabaseError,
};

/// Insert a new user row. Returns `None` when the login is already taken.
pub async fn create_user(
    login: &str,
    pass_hash: &str,
    conn: &mut PgConnection,
) -> Result<Option<User>, PgDatabaseError> {
    let user = sqlx::query_as::<_, User>(
        r#"
            INSERT INTO users (login, pass, loyalty_balance)
                VALUES ($1, $2, 0)
                ON CONFLICT (login) DO NOTHING
                RETURNING id, login, pass, loyalty_balance;
        "#,
    )
    .bind(login)
    .bind(pass_hash)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

pub async fn fetch_user_by_login(login: &str, conn: &mut PgConnection) -> Result<Option<User>, PgDatabaseError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, login, pass, loyalty_balance FROM users WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

pub async fn fetch_user_by_id(user_id: Uuid, conn: &mut PgConnection) -> Result<Option<User>, PgDatabaseError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, login, pass, loyalty_balance FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

/// Bulk balance/credential write. Embed in a transaction by passing `&mut *tx`.
pub async fn update_users(users: &[User], conn: &mut PgConnection) -> Result<(), PgDatabaseError> {
    for user in users {
        let _ = sqlx::query(
            "UPDATE users SET login = $1, pass = $2, loyalty_balance = $3 WHERE id = $4",
        )
        .bind(&user.login)
        .bind(&user.pass)
        .bind(user.balance)
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(FromRow)]
struct UserOrderRow {
    id: Uuid,
    login: String,
    pass: String,
    loyalty_balance: f64,
    order_id: String,
}

/// The owners of the given orders, with a map from user id to the subset of the input orders each
/// one owns. A single user may own several of the input orders.
pub async fn users_by_orders(
    numbers: &[OrderNumber],
    conn: &mut PgConnection,
) -> Result<(Vec<User>, HashMap<Uuid, Vec<OrderNumber>>), PgDatabaseError> {
    if numbers.is_empty() {
        return Ok((Vec::new(), HashMap::new()));
    }
    let ids: Vec<String> = numbers.iter().map(|n| n.as_str().to_string()).collect();
    let rows = sqlx::query_as::<_, UserOrderRow>(
        r#"
            SELECT users.id, users.login, users.pass, users.loyalty_balance, users_orders.order_id
                FROM users
                    JOIN users_orders ON
                        users_orders.user_id = users.id
                            AND users_orders.order_id = ANY($1)
                ORDER BY users.id;
        "#,
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    let mut users: Vec<User> = Vec::new();
    let mut mapping: HashMap<Uuid, Vec<OrderNumber>> = HashMap::new();
    for row in rows {
        if users.last().map(|u| u.id) != Some(row.id) {
            users.push(User {
                id: row.id,
                login: row.login,
                pass: row.pass,
                balance: row.loyalty_balance.into(),
            });
        }
        mapping.entry(row.id).or_default().push(OrderNumber(row.order_id));
    }
    Ok((users, mapping))
}
