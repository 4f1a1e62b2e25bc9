//! Signal-store writes: interest signals, customers, visitor links, orders
//!
//! These only validate and store rows. Targeting reads them on its next run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::domain::{Customer, EngineResult, NewSignal, Order, ValidationError, VisitorLink};

/// Stored row id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recorded {
    pub id: String,
}

/// Outcome of an order write; `created` is false for a replayed order id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecorded {
    pub id: String,
    pub created: bool,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn require(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Invalid(format!("{} is required", field)));
    }
    Ok(())
}

pub async fn record_signal(pool: &SqlitePool, signal: NewSignal) -> EngineResult<Recorded> {
    if is_blank(&signal.customer_id) && is_blank(&signal.visitor_id) {
        return Err(ValidationError::MissingIdentity.into());
    }
    if [&signal.product_id, &signal.brand_id, &signal.model_id, &signal.year_id]
        .into_iter()
        .all(is_blank)
    {
        return Err(ValidationError::Invalid(
            "A signal needs a productId, brandId, modelId or yearId".to_string(),
        )
        .into());
    }

    let id = db::insert_signal(pool, &signal, Utc::now()).await?;
    tracing::debug!(signal_id = %id, kind = %signal.kind, "Signal recorded");
    Ok(Recorded { id })
}

pub async fn upsert_customer(pool: &SqlitePool, customer: Customer) -> EngineResult<Customer> {
    require(&customer.id, "id")?;
    Ok(db::upsert_customer(pool, &customer, Utc::now()).await?)
}

pub async fn link_visitor(pool: &SqlitePool, link: VisitorLink) -> EngineResult<VisitorLink> {
    require(&link.visitor_id, "visitorId")?;
    require(&link.customer_id, "customerId")?;

    db::link_visitor(pool, &link.visitor_id, &link.customer_id, Utc::now()).await?;
    tracing::debug!(visitor_id = %link.visitor_id, customer_id = %link.customer_id, "Visitor linked");
    Ok(link)
}

pub async fn record_order(pool: &SqlitePool, order: Order) -> EngineResult<OrderRecorded> {
    require(&order.id, "id")?;
    if order.items.is_empty() {
        return Err(ValidationError::Invalid("An order needs at least one item".to_string()).into());
    }

    let created = db::insert_order(pool, &order).await?;
    Ok(OrderRecorded {
        id: order.id,
        created,
    })
}
