//! Aggregate queries backing campaign reports

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::to_db_time;

/// Raw target counters for one campaign and window
#[derive(Debug, Default, sqlx::FromRow)]
pub struct TargetTotalsRow {
    pub total_targets: i64,
    pub old_targets: i64,
    pub new_targets: i64,
    pub onsite_seen_count: i64,
    pub clicked_count: i64,
    pub converted_count: i64,
}

/// Count a campaign's targets overall and the funnel steps inside `[from, to]`.
///
/// Old and new are split on `starts_at` as it is now, not as it was when
/// each target was created.
pub async fn target_totals(
    pool: &SqlitePool,
    campaign_id: &str,
    starts_at: DateTime<Utc>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<TargetTotalsRow, sqlx::Error> {
    sqlx::query_as::<_, TargetTotalsRow>(
        r#"
        SELECT
            COUNT(*) AS total_targets,
            COALESCE(SUM(created_at <= ?1), 0) AS old_targets,
            COALESCE(SUM(created_at > ?1), 0) AS new_targets,
            COALESCE(SUM(first_impression_at BETWEEN ?2 AND ?3), 0) AS onsite_seen_count,
            COALESCE(SUM(first_click_at BETWEEN ?2 AND ?3), 0) AS clicked_count,
            COALESCE(SUM(status = 'converted' AND converted_at BETWEEN ?2 AND ?3), 0) AS converted_count
        FROM targets
        WHERE campaign_id = ?4
        "#,
    )
    .bind(to_db_time(starts_at))
    .bind(to_db_time(from))
    .bind(to_db_time(to))
    .bind(campaign_id)
    .fetch_one(pool)
    .await
}
