//! Funnel event log operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{from_db_time, to_db_time};
use crate::domain::{FunnelEvent, FunnelKind};

#[derive(Debug, sqlx::FromRow)]
pub struct FunnelEventRow {
    pub id: String,
    pub target_id: String,
    pub kind: String,
    pub occurred_at: String,
    pub order_id: Option<String>,
    pub path: Option<String>,
    pub created_at: String,
}

impl FunnelEventRow {
    pub fn to_event(&self) -> FunnelEvent {
        FunnelEvent {
            id: self.id.clone(),
            target_id: self.target_id.clone(),
            kind: self.kind.parse().unwrap_or(FunnelKind::Impression),
            occurred_at: from_db_time(&self.occurred_at),
            order_id: self.order_id.clone(),
            path: self.path.clone(),
            created_at: from_db_time(&self.created_at),
        }
    }
}

/// Append an event to the log
pub async fn insert_funnel_event(
    pool: &SqlitePool,
    target_id: &str,
    kind: FunnelKind,
    occurred_at: DateTime<Utc>,
    order_id: Option<&str>,
    path: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO funnel_events (id, target_id, kind, occurred_at, order_id, path, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(target_id)
    .bind(kind.as_str())
    .bind(to_db_time(occurred_at))
    .bind(order_id)
    .bind(path)
    .bind(to_db_time(now))
    .execute(pool)
    .await?;

    Ok(id)
}

/// Events recorded for a target, in arrival order
pub async fn list_funnel_events(pool: &SqlitePool, target_id: &str) -> Result<Vec<FunnelEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, FunnelEventRow>(
        "SELECT * FROM funnel_events WHERE target_id = ? ORDER BY created_at, id",
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.to_event()).collect())
}
