//! Signal store operations: signals, customers, visitor links, orders

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{from_db_time, to_db_time};
use crate::domain::{Customer, NewSignal, Order, OrderItem, SignalAggregate};

/// Columns a scope may filter signals and order items on
const SCOPE_COLUMNS: [&str; 4] = ["product_id", "brand_id", "model_id", "year_id"];

#[derive(Debug, sqlx::FromRow)]
struct SignalAggregateRow {
    customer_id: Option<String>,
    visitor_id: Option<String>,
    signals_count: i64,
    first_signal_at: String,
    last_signal_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    email_opt_out: bool,
    whatsapp_opt_out: bool,
}

impl CustomerRow {
    fn to_customer(&self) -> Customer {
        Customer {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            email_opt_out: self.email_opt_out,
            whatsapp_opt_out: self.whatsapp_opt_out,
        }
    }
}

/// Record one interest signal
pub async fn insert_signal(
    pool: &SqlitePool,
    signal: &NewSignal,
    now: DateTime<Utc>,
) -> Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO signals (id, customer_id, visitor_id, product_id, brand_id, model_id, year_id, kind, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&signal.customer_id)
    .bind(&signal.visitor_id)
    .bind(&signal.product_id)
    .bind(&signal.brand_id)
    .bind(&signal.model_id)
    .bind(&signal.year_id)
    .bind(&signal.kind)
    .bind(to_db_time(signal.occurred_at.unwrap_or(now)))
    .execute(pool)
    .await?;

    Ok(id)
}

/// Group matching signals since `since` by recipient.
///
/// Visitors linked to a customer are folded into the customer's group.
pub async fn aggregate_signals(
    pool: &SqlitePool,
    column: &str,
    key: &str,
    since: DateTime<Utc>,
) -> Result<Vec<SignalAggregate>, sqlx::Error> {
    if !SCOPE_COLUMNS.contains(&column) {
        return Err(sqlx::Error::ColumnNotFound(column.to_string()));
    }

    let query = format!(
        r#"
        SELECT
            COALESCE(s.customer_id, vl.customer_id) AS customer_id,
            CASE WHEN COALESCE(s.customer_id, vl.customer_id) IS NULL THEN s.visitor_id END AS visitor_id,
            COUNT(*) AS signals_count,
            MIN(s.occurred_at) AS first_signal_at,
            MAX(s.occurred_at) AS last_signal_at
        FROM signals s
        LEFT JOIN visitor_links vl ON vl.visitor_id = s.visitor_id
        WHERE s.{column} = ? AND s.occurred_at >= ?
        GROUP BY 1, 2
        ORDER BY first_signal_at
        "#,
        column = column
    );

    let rows = sqlx::query_as::<_, SignalAggregateRow>(&query)
        .bind(key)
        .bind(to_db_time(since))
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| SignalAggregate {
            customer_id: r.customer_id,
            visitor_id: r.visitor_id,
            signals_count: r.signals_count,
            first_signal_at: from_db_time(&r.first_signal_at),
            last_signal_at: from_db_time(&r.last_signal_at),
        })
        .collect())
}

/// Insert or replace a customer directory entry
pub async fn upsert_customer(
    pool: &SqlitePool,
    customer: &Customer,
    now: DateTime<Utc>,
) -> Result<Customer, sqlx::Error> {
    let now_str = to_db_time(now);

    sqlx::query(
        r#"
        INSERT INTO customers (id, name, email, phone, email_opt_out, whatsapp_opt_out, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            email = excluded.email,
            phone = excluded.phone,
            email_opt_out = excluded.email_opt_out,
            whatsapp_opt_out = excluded.whatsapp_opt_out,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&customer.id)
    .bind(&customer.name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .bind(customer.email_opt_out)
    .bind(customer.whatsapp_opt_out)
    .bind(&now_str)
    .bind(&now_str)
    .execute(pool)
    .await?;

    get_customer(pool, &customer.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn get_customer(pool: &SqlitePool, customer_id: &str) -> Result<Option<Customer>, sqlx::Error> {
    let row = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, name, email, phone, email_opt_out, whatsapp_opt_out FROM customers WHERE id = ?",
    )
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.to_customer()))
}

/// Link a visitor to a customer. A later link for the same visitor wins.
pub async fn link_visitor(
    pool: &SqlitePool,
    visitor_id: &str,
    customer_id: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO visitor_links (visitor_id, customer_id, linked_at)
        VALUES (?, ?, ?)
        ON CONFLICT(visitor_id) DO UPDATE SET customer_id = excluded.customer_id, linked_at = excluded.linked_at
        "#,
    )
    .bind(visitor_id)
    .bind(customer_id)
    .bind(to_db_time(now))
    .execute(pool)
    .await?;
    Ok(())
}

/// Customer a visitor has been linked to, if any
pub async fn resolve_visitor(pool: &SqlitePool, visitor_id: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT customer_id FROM visitor_links WHERE visitor_id = ?")
        .bind(visitor_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(customer_id,)| customer_id))
}

/// Store an order with its items. Re-recording an existing order id is a no-op.
pub async fn insert_order(pool: &SqlitePool, order: &Order) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO orders (id, customer_id, visitor_id, placed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&order.id)
    .bind(&order.customer_id)
    .bind(&order.visitor_id)
    .bind(to_db_time(order.placed_at))
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, brand_id, model_id, year_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&order.id)
        .bind(&item.product_id)
        .bind(&item.brand_id)
        .bind(&item.model_id)
        .bind(&item.year_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Get an order with its items
pub async fn get_order(pool: &SqlitePool, order_id: &str) -> Result<Option<Order>, sqlx::Error> {
    let header: Option<(String, Option<String>, Option<String>, String)> = sqlx::query_as(
        "SELECT id, customer_id, visitor_id, placed_at FROM orders WHERE id = ?",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    let Some((id, customer_id, visitor_id, placed_at)) = header else {
        return Ok(None);
    };

    let items: Vec<(Option<String>, Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT product_id, brand_id, model_id, year_id FROM order_items WHERE order_id = ?",
    )
    .bind(&id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Order {
        id,
        customer_id,
        visitor_id,
        placed_at: from_db_time(&placed_at),
        items: items
            .into_iter()
            .map(|(product_id, brand_id, model_id, year_id)| OrderItem {
                product_id,
                brand_id,
                model_id,
                year_id,
            })
            .collect(),
    }))
}
