//! Report aggregator: read-only campaign views
//!
//! Nothing here writes or locks. Figures are computed from committed rows
//! at request time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db;
use crate::domain::{
    Campaign, CampaignReport, Channel, ChannelSummary, EngineError, EngineResult, ReportWindow,
    TargetListParams, TargetPage, ValidationError,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Per-channel message counts of a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub email: ChannelSummary,
    pub whatsapp: ChannelSummary,
}

async fn load_campaign(pool: &SqlitePool, campaign_id: &str) -> EngineResult<Campaign> {
    db::get_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| EngineError::campaign_not_found(campaign_id))
}

/// Build the campaign report for a window.
///
/// Explicit `from`/`to` bounds replace the window's own bounds.
pub async fn report(
    pool: &SqlitePool,
    campaign_id: &str,
    window: ReportWindow,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> EngineResult<CampaignReport> {
    let campaign = load_campaign(pool, campaign_id).await?;

    let (window_from, window_to) = window.bounds(campaign.starts_at, campaign.ends_at, Utc::now());
    if from.is_some() || to.is_some() {
        let (from, to) = (from.unwrap_or(window_from), to.unwrap_or(window_to));
        if from > to {
            return Err(ValidationError::Invalid("from must not be after to".to_string()).into());
        }
    }
    let from = from.unwrap_or(window_from);
    let to = to.unwrap_or(window_to);

    let totals = db::target_totals(pool, campaign_id, campaign.starts_at, from, to).await?;
    let targets_by_status = db::count_targets_by_status(pool, campaign_id).await?;
    let messages = summarize(db::channel_summaries(pool, campaign_id).await?);

    let conversion_rate = if totals.total_targets > 0 {
        totals.converted_count as f64 / totals.total_targets as f64
    } else {
        0.0
    };

    Ok(CampaignReport {
        campaign_id: campaign.id,
        from,
        to,
        total_targets: totals.total_targets,
        old_targets: totals.old_targets,
        new_targets: totals.new_targets,
        onsite_seen_count: totals.onsite_seen_count,
        clicked_count: totals.clicked_count,
        converted_count: totals.converted_count,
        conversion_rate,
        targets_by_status,
        email: messages.email,
        whatsapp: messages.whatsapp,
    })
}

fn summarize(summaries: Vec<ChannelSummary>) -> MessageSummary {
    let pick = |channel: Channel| {
        summaries
            .iter()
            .find(|s| s.channel == Some(channel))
            .cloned()
            .unwrap_or_else(|| ChannelSummary::for_channel(channel))
    };
    MessageSummary {
        email: pick(Channel::Email),
        whatsapp: pick(Channel::Whatsapp),
    }
}

pub async fn message_summary(pool: &SqlitePool, campaign_id: &str) -> EngineResult<MessageSummary> {
    load_campaign(pool, campaign_id).await?;
    Ok(summarize(db::channel_summaries(pool, campaign_id).await?))
}

fn parse_cursor(cursor: &str) -> EngineResult<(&str, &str)> {
    cursor
        .split_once('|')
        .filter(|(created_at, id)| !created_at.is_empty() && !id.is_empty())
        .ok_or_else(|| ValidationError::Invalid(format!("Invalid cursor: {}", cursor)).into())
}

/// One page of a campaign's targets, oldest first
pub async fn list_targets(
    pool: &SqlitePool,
    campaign_id: &str,
    params: TargetListParams,
) -> EngineResult<TargetPage> {
    let campaign = load_campaign(pool, campaign_id).await?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let after = params.cursor.as_deref().map(parse_cursor).transpose()?;

    let mut rows = db::list_target_page(
        pool,
        campaign_id,
        params.status,
        params.q.as_deref(),
        after,
        limit + 1,
    )
    .await?;

    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    let next_cursor = if has_more {
        rows.last()
            .map(|r| format!("{}|{}", r.target.created_at, r.target.id))
    } else {
        None
    };

    Ok(TargetPage {
        items: rows.iter().map(|r| r.to_view(campaign.starts_at)).collect(),
        next_cursor,
    })
}
