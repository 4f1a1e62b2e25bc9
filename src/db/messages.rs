//! Message job database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{from_db_time, from_db_time_opt, to_db_time};
use crate::domain::{Channel, ChannelSummary, Message, MessageStatus, TargetStatus};

/// Row type for messages table
#[derive(Debug, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub target_id: String,
    pub channel: String,
    pub status: String,
    pub created_at: String,
    pub claimed_at: Option<String>,
    pub sent_at: Option<String>,
    pub error: Option<String>,
    pub provider_message_id: Option<String>,
}

impl MessageRow {
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            target_id: self.target_id.clone(),
            channel: self.channel.parse().unwrap_or(Channel::Email),
            status: self.status.parse().unwrap_or(MessageStatus::Pending),
            created_at: from_db_time(&self.created_at),
            claimed_at: from_db_time_opt(&self.claimed_at),
            sent_at: from_db_time_opt(&self.sent_at),
            error: self.error.clone(),
            provider_message_id: self.provider_message_id.clone(),
        }
    }
}

/// Everything needed to decide on and perform one claimed send
#[derive(Debug, sqlx::FromRow)]
pub struct DeliveryRow {
    pub message_id: String,
    pub target_id: String,
    pub campaign_id: String,
    pub target_status: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub email_opt_out: Option<bool>,
    pub whatsapp_opt_out: Option<bool>,
}

impl DeliveryRow {
    pub fn target_status(&self) -> TargetStatus {
        self.target_status.parse().unwrap_or(TargetStatus::Pending)
    }
}

/// Insert pending jobs for `target_ids` on one channel.
///
/// A target that already has a job on the channel is skipped, whatever the
/// job's status. Returns the number of rows created.
pub async fn insert_messages(
    pool: &SqlitePool,
    channel: Channel,
    target_ids: &[String],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if target_ids.is_empty() {
        return Ok(0);
    }

    let now_str = to_db_time(now);
    let mut created = 0;
    let mut tx = pool.begin().await?;

    for target_id in target_ids {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, target_id, channel, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            ON CONFLICT(target_id, channel) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(target_id)
        .bind(channel.as_str())
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;

        created += result.rows_affected();
    }

    tx.commit().await?;
    Ok(created)
}

pub async fn get_message(pool: &SqlitePool, message_id: &str) -> Result<Option<Message>, sqlx::Error> {
    let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_message()))
}

/// All jobs of a campaign, oldest first
pub async fn list_campaign_messages(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<Vec<Message>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT m.* FROM messages m
        JOIN targets t ON t.id = m.target_id
        WHERE t.campaign_id = ?
        ORDER BY m.created_at, m.id
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.to_message()).collect())
}

/// Fail `sending` rows claimed before `cutoff`.
///
/// They may or may not have reached the provider, so they are never put
/// back to pending.
pub async fn fail_stale_claims(
    pool: &SqlitePool,
    channel: Channel,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE messages SET status = 'failed', error = 'claim expired' WHERE channel = ? AND status = 'sending' AND claimed_at < ?",
    )
    .bind(channel.as_str())
    .bind(to_db_time(cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Pending jobs on a channel that a claim would pick up: draft and paused
/// campaigns are left out, same as [`claim_pending`]
pub async fn count_pending(pool: &SqlitePool, channel: Channel) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM messages m
        JOIN targets t ON t.id = m.target_id
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE m.channel = ?
          AND m.status = 'pending'
          AND c.status NOT IN ('draft', 'paused')
        "#,
    )
    .bind(channel.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Atomically claim up to `limit` pending jobs on a channel.
///
/// Jobs of draft or paused campaigns stay pending. The claim is a single
/// conditional update, so a row claimed here is invisible to every other
/// claimer.
pub async fn claim_pending(
    pool: &SqlitePool,
    channel: Channel,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        UPDATE messages
        SET status = 'sending', claimed_at = ?1
        WHERE status = 'pending'
          AND id IN (
            SELECT m.id FROM messages m
            JOIN targets t ON t.id = m.target_id
            JOIN campaigns c ON c.id = t.campaign_id
            WHERE m.channel = ?2
              AND m.status = 'pending'
              AND c.status NOT IN ('draft', 'paused')
            ORDER BY m.created_at, m.id
            LIMIT ?3
          )
        RETURNING id
        "#,
    )
    .bind(to_db_time(now))
    .bind(channel.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Delivery context for claimed jobs
pub async fn load_deliveries(
    pool: &SqlitePool,
    message_ids: &[String],
) -> Result<Vec<DeliveryRow>, sqlx::Error> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<&str> = message_ids.iter().map(|_| "?").collect();
    let query = format!(
        r#"
        SELECT m.id AS message_id, t.id AS target_id, t.campaign_id AS campaign_id,
               t.status AS target_status, t.customer_id AS customer_id,
               c.name AS customer_name, c.email AS email, c.phone AS phone,
               c.email_opt_out AS email_opt_out, c.whatsapp_opt_out AS whatsapp_opt_out
        FROM messages m
        JOIN targets t ON t.id = m.target_id
        LEFT JOIN customers c ON c.id = t.customer_id
        WHERE m.id IN ({})
        ORDER BY m.created_at, m.id
        "#,
        placeholders.join(",")
    );

    let mut q = sqlx::query_as::<_, DeliveryRow>(&query);
    for id in message_ids {
        q = q.bind(id);
    }
    q.fetch_all(pool).await
}

pub async fn mark_message_sent(
    pool: &SqlitePool,
    message_id: &str,
    at: DateTime<Utc>,
    provider_message_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE messages SET status = 'sent', sent_at = ?, provider_message_id = ?, error = NULL WHERE id = ? AND status = 'sending'",
    )
    .bind(to_db_time(at))
    .bind(provider_message_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_message_failed(
    pool: &SqlitePool,
    message_id: &str,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE messages SET status = 'failed', error = ? WHERE id = ? AND status = 'sending'")
        .bind(error)
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Close a claimed job without sending it
pub async fn mark_message_skipped(
    pool: &SqlitePool,
    message_id: &str,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE messages SET status = 'skipped', error = ? WHERE id = ? AND status = 'sending'")
        .bind(reason)
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Put a campaign's failed jobs back to pending
pub async fn reset_failed(
    pool: &SqlitePool,
    campaign_id: &str,
    channel: Option<Channel>,
) -> Result<u64, sqlx::Error> {
    let mut query = String::from(
        r#"
        UPDATE messages
        SET status = 'pending', error = NULL, claimed_at = NULL
        WHERE status = 'failed'
          AND target_id IN (SELECT id FROM targets WHERE campaign_id = ?)
        "#,
    );
    if channel.is_some() {
        query.push_str(" AND channel = ?");
    }

    let mut q = sqlx::query(&query).bind(campaign_id);
    if let Some(channel) = channel {
        q = q.bind(channel.as_str());
    }
    let result = q.execute(pool).await?;

    Ok(result.rows_affected())
}

/// Per-channel job counts for a campaign, email first
pub async fn channel_summaries(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<Vec<ChannelSummary>, sqlx::Error> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT m.channel, m.status, COUNT(*)
        FROM messages m
        JOIN targets t ON t.id = m.target_id
        WHERE t.campaign_id = ?
        GROUP BY m.channel, m.status
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    let mut summaries: Vec<ChannelSummary> = Channel::ALL
        .iter()
        .map(|c| ChannelSummary::for_channel(*c))
        .collect();

    for (channel, status, count) in rows {
        let (Ok(channel), Ok(status)) = (channel.parse::<Channel>(), status.parse::<MessageStatus>()) else {
            continue;
        };
        if let Some(summary) = summaries.iter_mut().find(|s| s.channel == Some(channel)) {
            summary.record(status, count);
        }
    }

    Ok(summaries)
}
