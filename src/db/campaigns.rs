//! Campaign database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{from_db_time, from_db_time_opt, to_db_time};
use crate::domain::{
    Campaign, CampaignScope, CampaignStatus, ChannelFlags, NormalizedSpec, TargetingConfig,
};

/// Row type for campaigns table
#[derive(Debug, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: String,
    pub name: String,
    pub scope_kind: String,
    pub product_id: Option<String>,
    pub brand_id: Option<String>,
    pub model_id: Option<String>,
    pub year_id: Option<String>,
    pub campaign_type: String,
    pub audience_mode: String,
    pub send_onsite: bool,
    pub send_email: bool,
    pub send_whatsapp: bool,
    pub only_customers: bool,
    pub lookback_days: i64,
    pub min_signals: i64,
    pub onsite_paths: Option<String>,
    pub status: String,
    pub starts_at: String,
    pub ends_at: Option<String>,
    pub discount_price: Option<f64>,
    pub coupon_code: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub whatsapp_body: Option<String>,
    pub last_refreshed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CampaignRow {
    pub fn to_campaign(&self) -> Result<Campaign, sqlx::Error> {
        let scope = CampaignScope::from_columns(
            &self.scope_kind,
            self.product_id.clone(),
            self.brand_id.clone(),
            self.model_id.clone(),
            self.year_id.clone(),
        )
        .ok_or_else(|| decode_error(format!("campaign {} has an incomplete {} scope", self.id, self.scope_kind)))?;

        Ok(Campaign {
            id: self.id.clone(),
            name: self.name.clone(),
            scope,
            campaign_type: self.campaign_type.parse().map_err(decode_error)?,
            audience_mode: self.audience_mode.parse().map_err(decode_error)?,
            channels: ChannelFlags {
                send_onsite: self.send_onsite,
                send_email: self.send_email,
                send_whatsapp: self.send_whatsapp,
            },
            targeting: TargetingConfig {
                only_customers: self.only_customers,
                lookback_days: self.lookback_days,
                min_signals: self.min_signals,
            },
            onsite_paths: self
                .onsite_paths
                .as_ref()
                .and_then(|p| serde_json::from_str(p).ok()),
            status: self.status.parse().map_err(decode_error)?,
            starts_at: from_db_time(&self.starts_at),
            ends_at: from_db_time_opt(&self.ends_at),
            discount_price: self.discount_price,
            coupon_code: self.coupon_code.clone(),
            email_subject: self.email_subject.clone(),
            email_body: self.email_body.clone(),
            whatsapp_body: self.whatsapp_body.clone(),
            last_refreshed_at: from_db_time_opt(&self.last_refreshed_at),
            created_at: from_db_time(&self.created_at),
            updated_at: from_db_time(&self.updated_at),
        })
    }
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn paths_json(paths: &Option<Vec<String>>) -> Option<String> {
    paths
        .as_ref()
        .and_then(|p| serde_json::to_string(p).ok())
}

/// Insert a validated campaign
pub async fn insert_campaign(
    pool: &SqlitePool,
    id: &str,
    normalized: &NormalizedSpec,
    now: DateTime<Utc>,
) -> Result<Campaign, sqlx::Error> {
    let spec = normalized.spec();
    let now_str = to_db_time(now);

    sqlx::query(
        r#"
        INSERT INTO campaigns (
            id, name, scope_kind, product_id, brand_id, model_id, year_id,
            campaign_type, audience_mode, send_onsite, send_email, send_whatsapp,
            only_customers, lookback_days, min_signals, onsite_paths,
            status, starts_at, ends_at, discount_price, coupon_code,
            email_subject, email_body, whatsapp_body, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&spec.name)
    .bind(spec.scope.kind())
    .bind(spec.scope.product_id())
    .bind(spec.scope.brand_id())
    .bind(spec.scope.model_id())
    .bind(spec.scope.year_id())
    .bind(spec.campaign_type.as_str())
    .bind(spec.audience_mode.as_str())
    .bind(spec.channels.send_onsite)
    .bind(spec.channels.send_email)
    .bind(spec.channels.send_whatsapp)
    .bind(spec.targeting.only_customers)
    .bind(spec.targeting.lookback_days)
    .bind(spec.targeting.min_signals)
    .bind(paths_json(&spec.onsite_paths))
    .bind(normalized.initial_status().as_str())
    .bind(to_db_time(normalized.starts_at()))
    .bind(spec.ends_at.map(to_db_time))
    .bind(spec.discount_price)
    .bind(&spec.coupon_code)
    .bind(&spec.email_subject)
    .bind(&spec.email_body)
    .bind(&spec.whatsapp_body)
    .bind(&now_str)
    .bind(&now_str)
    .execute(pool)
    .await?;

    get_campaign(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Get a campaign by ID
pub async fn get_campaign(pool: &SqlitePool, campaign_id: &str) -> Result<Option<Campaign>, sqlx::Error> {
    let row = sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = ?")
        .bind(campaign_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| r.to_campaign()).transpose()
}

/// List campaigns, newest first
pub async fn list_campaigns(
    pool: &SqlitePool,
    status: Option<CampaignStatus>,
) -> Result<Vec<Campaign>, sqlx::Error> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, CampaignRow>(
                "SELECT * FROM campaigns WHERE status = ? ORDER BY created_at DESC, id",
            )
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns ORDER BY created_at DESC, id")
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(|r| r.to_campaign()).collect()
}

/// Active campaigns shown on-site
pub async fn list_onsite_campaigns(pool: &SqlitePool) -> Result<Vec<Campaign>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        "SELECT * FROM campaigns WHERE status = 'active' AND send_onsite = 1 ORDER BY starts_at DESC, id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.to_campaign()).collect()
}

/// Overwrite the editable fields of a campaign.
///
/// Scope and audience mode are never written. Returns false when the
/// campaign is gone or has reached a terminal status meanwhile.
pub async fn update_campaign_fields(
    pool: &SqlitePool,
    campaign_id: &str,
    normalized: &NormalizedSpec,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let spec = normalized.spec();

    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET name = ?, campaign_type = ?, send_onsite = ?, send_email = ?, send_whatsapp = ?,
            only_customers = ?, lookback_days = ?, min_signals = ?, onsite_paths = ?,
            starts_at = ?, ends_at = ?, discount_price = ?, coupon_code = ?,
            email_subject = ?, email_body = ?, whatsapp_body = ?, updated_at = ?
        WHERE id = ? AND status NOT IN ('finished', 'cancelled')
        "#,
    )
    .bind(&spec.name)
    .bind(spec.campaign_type.as_str())
    .bind(spec.channels.send_onsite)
    .bind(spec.channels.send_email)
    .bind(spec.channels.send_whatsapp)
    .bind(spec.targeting.only_customers)
    .bind(spec.targeting.lookback_days)
    .bind(spec.targeting.min_signals)
    .bind(paths_json(&spec.onsite_paths))
    .bind(to_db_time(normalized.starts_at()))
    .bind(spec.ends_at.map(to_db_time))
    .bind(spec.discount_price)
    .bind(&spec.coupon_code)
    .bind(&spec.email_subject)
    .bind(&spec.email_body)
    .bind(&spec.whatsapp_body)
    .bind(to_db_time(now))
    .bind(campaign_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Conditionally move a campaign from `from` to `to`.
///
/// Returns false if the stored status is no longer `from`.
pub async fn update_campaign_status(
    pool: &SqlitePool,
    campaign_id: &str,
    from: CampaignStatus,
    to: CampaignStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(to_db_time(now))
        .bind(campaign_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Stamp the end of a targeting run
pub async fn set_last_refreshed(
    pool: &SqlitePool,
    campaign_id: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET last_refreshed_at = ? WHERE id = ?")
        .bind(to_db_time(at))
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a campaign unless it still has messages waiting or in flight.
///
/// The check and the delete run in one statement so a concurrent build
/// cannot slip a pending message in between.
pub async fn delete_campaign_if_idle(pool: &SqlitePool, campaign_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM campaigns
        WHERE id = ?
          AND NOT EXISTS (
            SELECT 1 FROM messages m
            JOIN targets t ON t.id = m.target_id
            WHERE t.campaign_id = campaigns.id AND m.status IN ('pending', 'sending')
          )
        "#,
    )
    .bind(campaign_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
