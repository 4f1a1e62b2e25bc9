//! Target database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{from_db_time, from_db_time_opt, to_db_time};
use crate::domain::{FunnelKind, NewTarget, Target, TargetStatus, TargetStatusCounts, TargetView};
use crate::state_machine::target_sources;

/// Row type for targets table
#[derive(Debug, sqlx::FromRow)]
pub struct TargetRow {
    pub id: String,
    pub campaign_id: String,
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub signals_count: i64,
    pub last_signal_at: Option<String>,
    pub status: String,
    pub created_at: String,
    pub notified_at: Option<String>,
    pub first_impression_at: Option<String>,
    pub first_click_at: Option<String>,
    pub first_close_at: Option<String>,
    pub first_order_at: Option<String>,
    pub converted_at: Option<String>,
    pub conversion_order_id: Option<String>,
}

impl TargetRow {
    pub fn to_target(&self) -> Target {
        Target {
            id: self.id.clone(),
            campaign_id: self.campaign_id.clone(),
            customer_id: self.customer_id.clone(),
            visitor_id: self.visitor_id.clone(),
            signals_count: self.signals_count,
            last_signal_at: from_db_time_opt(&self.last_signal_at),
            status: self.status.parse().unwrap_or(TargetStatus::Pending),
            created_at: from_db_time(&self.created_at),
            notified_at: from_db_time_opt(&self.notified_at),
            first_impression_at: from_db_time_opt(&self.first_impression_at),
            first_click_at: from_db_time_opt(&self.first_click_at),
            first_close_at: from_db_time_opt(&self.first_close_at),
            first_order_at: from_db_time_opt(&self.first_order_at),
            converted_at: from_db_time_opt(&self.converted_at),
            conversion_order_id: self.conversion_order_id.clone(),
        }
    }
}

/// Target joined with its customer's contact details
#[derive(Debug, sqlx::FromRow)]
pub struct TargetViewRow {
    #[sqlx(flatten)]
    pub target: TargetRow,
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl TargetViewRow {
    pub fn to_view(&self, starts_at: DateTime<Utc>) -> TargetView {
        let target = self.target.to_target();
        TargetView {
            is_new: target.is_new(starts_at),
            target,
            customer_name: self.customer_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Customer target that may get a message job, with its raw contact details
#[derive(Debug, sqlx::FromRow)]
pub struct MessageCandidateRow {
    pub target_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Quoted SQL list of the statuses allowed to move into `to`
fn sources_clause(to: TargetStatus) -> String {
    target_sources(to)
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Insert targets, skipping recipients the campaign already has.
///
/// Returns the number of rows actually created. Existing targets are left
/// untouched, so concurrent runs over the same signals create each target once.
pub async fn insert_targets(
    pool: &SqlitePool,
    campaign_id: &str,
    targets: &[NewTarget],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if targets.is_empty() {
        return Ok(0);
    }

    let now_str = to_db_time(now);
    let mut created = 0;
    let mut tx = pool.begin().await?;

    for target in targets {
        // A customer whose linked visitor already holds a target keeps that one
        let result = sqlx::query(
            r#"
            INSERT INTO targets (id, campaign_id, customer_id, visitor_id, signals_count, last_signal_at, status, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7
            WHERE NOT EXISTS (
                SELECT 1 FROM targets t
                JOIN visitor_links vl ON vl.visitor_id = t.visitor_id
                WHERE t.campaign_id = ?2 AND vl.customer_id = ?3
            )
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(campaign_id)
        .bind(target.recipient.customer_id())
        .bind(target.recipient.visitor_id())
        .bind(target.signals_count)
        .bind(to_db_time(target.last_signal_at))
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;

        created += result.rows_affected();
    }

    tx.commit().await?;
    Ok(created)
}

/// Get a target by ID
pub async fn get_target(pool: &SqlitePool, target_id: &str) -> Result<Option<Target>, sqlx::Error> {
    let row = sqlx::query_as::<_, TargetRow>("SELECT * FROM targets WHERE id = ?")
        .bind(target_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_target()))
}

/// Find a campaign's target for a customer or visitor.
///
/// A visitor linked to a customer resolves to the customer's target first.
pub async fn find_target_by_identity(
    pool: &SqlitePool,
    campaign_id: &str,
    customer_id: Option<&str>,
    visitor_id: Option<&str>,
) -> Result<Option<Target>, sqlx::Error> {
    let row = sqlx::query_as::<_, TargetRow>(
        r#"
        SELECT t.* FROM targets t
        WHERE t.campaign_id = ?1
          AND (
            t.customer_id = ?2
            OR t.customer_id = (SELECT customer_id FROM visitor_links WHERE visitor_id = ?3)
            OR t.visitor_id = ?3
          )
        ORDER BY t.customer_id IS NULL, t.created_at
        LIMIT 1
        "#,
    )
    .bind(campaign_id)
    .bind(customer_id)
    .bind(visitor_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.to_target()))
}

/// One page of a campaign's targets in `(created_at, id)` order
pub async fn list_target_page(
    pool: &SqlitePool,
    campaign_id: &str,
    status: Option<TargetStatus>,
    q: Option<&str>,
    after: Option<(&str, &str)>,
    limit: i64,
) -> Result<Vec<TargetViewRow>, sqlx::Error> {
    let mut query = String::from(
        r#"
        SELECT t.*, c.name AS customer_name, c.email AS email, c.phone AS phone
        FROM targets t
        LEFT JOIN customers c ON c.id = t.customer_id
        WHERE t.campaign_id = ?
        "#,
    );
    let mut bindings: Vec<String> = vec![campaign_id.to_string()];

    if let Some(status) = status {
        query.push_str(" AND t.status = ?");
        bindings.push(status.as_str().to_string());
    }

    if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
        query.push_str(
            " AND (c.name LIKE ? OR c.email LIKE ? OR c.phone LIKE ? OR t.id LIKE ? OR t.customer_id LIKE ? OR t.visitor_id LIKE ?)",
        );
        let pattern = format!("%{}%", q);
        for _ in 0..6 {
            bindings.push(pattern.clone());
        }
    }

    if let Some((created_at, id)) = after {
        query.push_str(" AND (t.created_at > ? OR (t.created_at = ? AND t.id > ?))");
        bindings.push(created_at.to_string());
        bindings.push(created_at.to_string());
        bindings.push(id.to_string());
    }

    query.push_str(" ORDER BY t.created_at, t.id LIMIT ?");

    let mut q = sqlx::query_as::<_, TargetViewRow>(&query);
    for binding in &bindings {
        q = q.bind(binding);
    }
    q.bind(limit).fetch_all(pool).await
}

/// Customer targets in a messageable status, with contact details
pub async fn list_message_candidates(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<Vec<MessageCandidateRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageCandidateRow>(
        r#"
        SELECT t.id AS target_id, c.email AS email, c.phone AS phone
        FROM targets t
        JOIN customers c ON c.id = t.customer_id
        WHERE t.campaign_id = ? AND t.status IN ('pending', 'notified')
        ORDER BY t.created_at, t.id
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}

/// Move a target to `notified` after its first delivered message.
///
/// No-op for targets already further along.
pub async fn mark_target_notified(
    pool: &SqlitePool,
    target_id: &str,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let query = format!(
        "UPDATE targets SET status = 'notified', notified_at = ? WHERE id = ? AND status IN ({})",
        sources_clause(TargetStatus::Notified)
    );
    let result = sqlx::query(&query)
        .bind(to_db_time(at))
        .bind(target_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Exclude a target from further messaging
pub async fn mark_target_skipped(pool: &SqlitePool, target_id: &str) -> Result<bool, sqlx::Error> {
    let query = format!(
        "UPDATE targets SET status = 'skipped' WHERE id = ? AND status IN ({})",
        sources_clause(TargetStatus::Skipped)
    );
    let result = sqlx::query(&query).bind(target_id).execute(pool).await?;

    Ok(result.rows_affected() > 0)
}

/// Record the order that converted a target. First conversion wins.
pub async fn mark_target_converted(
    pool: &SqlitePool,
    target_id: &str,
    at: DateTime<Utc>,
    order_id: &str,
) -> Result<bool, sqlx::Error> {
    let query = format!(
        "UPDATE targets SET status = 'converted', converted_at = ?, conversion_order_id = ? WHERE id = ? AND status IN ({})",
        sources_clause(TargetStatus::Converted)
    );
    let result = sqlx::query(&query)
        .bind(to_db_time(at))
        .bind(order_id)
        .bind(target_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Cache the first occurrence of a funnel event kind.
///
/// Returns true only for the write that set the column.
pub async fn set_first_occurrence(
    pool: &SqlitePool,
    target_id: &str,
    kind: FunnelKind,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let column = kind.first_at_column();
    let query = format!(
        "UPDATE targets SET {column} = ? WHERE id = ? AND {column} IS NULL",
        column = column
    );
    let result = sqlx::query(&query)
        .bind(to_db_time(at))
        .bind(target_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count targets per status for a campaign
pub async fn count_targets_by_status(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<TargetStatusCounts, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM targets WHERE campaign_id = ? GROUP BY status",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    let mut counts = TargetStatusCounts::default();
    for (status, count) in rows {
        match status.parse() {
            Ok(TargetStatus::Pending) => counts.pending = count,
            Ok(TargetStatus::Notified) => counts.notified = count,
            Ok(TargetStatus::Converted) => counts.converted = count,
            Ok(TargetStatus::Skipped) => counts.skipped = count,
            Err(_) => {}
        }
    }
    Ok(counts)
}
