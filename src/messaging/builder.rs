//! Message builder: one pending job per (target, channel)

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db;
use crate::domain::{BuildResult, Campaign, Channel, EngineError, EngineResult, ResetResult};

async fn load_campaign(pool: &SqlitePool, campaign_id: &str) -> EngineResult<Campaign> {
    db::get_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| EngineError::campaign_not_found(campaign_id))
}

fn ensure_open(campaign: &Campaign) -> EngineResult<()> {
    if campaign.status.is_terminal() {
        return Err(EngineError::precondition(format!(
            "Campaign is {} and can no longer send messages",
            campaign.status
        )));
    }
    Ok(())
}

/// Queue jobs for every messageable target with an address on each enabled
/// channel. Safe to call repeatedly: existing jobs are never duplicated.
pub async fn build_messages(pool: &SqlitePool, campaign_id: &str) -> EngineResult<BuildResult> {
    let campaign = load_campaign(pool, campaign_id).await?;

    let channels = campaign.channels.message_channels();
    if channels.is_empty() {
        return Err(EngineError::precondition(
            "Campaign has no email or WhatsApp channel enabled",
        ));
    }
    ensure_open(&campaign)?;

    let now = Utc::now();
    let candidates = db::list_message_candidates(pool, campaign_id).await?;
    let mut result = BuildResult::default();

    for channel in channels {
        let target_ids: Vec<String> = candidates
            .iter()
            .filter(|c| {
                let address = match channel {
                    Channel::Email => c.email.as_deref(),
                    Channel::Whatsapp => c.phone.as_deref(),
                };
                address.map_or(false, |a| !a.trim().is_empty())
            })
            .map(|c| c.target_id.clone())
            .collect();

        let created = db::insert_messages(pool, channel, &target_ids, now).await?;
        result.add(channel, created);

        tracing::debug!(
            campaign_id = %campaign_id,
            channel = %channel,
            eligible = target_ids.len(),
            created,
            "Messages queued"
        );
    }

    tracing::info!(
        campaign_id = %campaign_id,
        created_email = result.created_email,
        created_whatsapp = result.created_whatsapp,
        "Message build complete"
    );

    Ok(result)
}

/// Put failed jobs back in the queue, optionally for one channel only
pub async fn reset_failed_messages(
    pool: &SqlitePool,
    campaign_id: &str,
    channel: Option<Channel>,
) -> EngineResult<ResetResult> {
    let campaign = load_campaign(pool, campaign_id).await?;
    ensure_open(&campaign)?;

    let reset = db::reset_failed(pool, campaign_id, channel).await?;
    tracing::info!(campaign_id = %campaign_id, channel = ?channel, reset, "Failed messages reset");

    Ok(ResetResult { reset })
}
