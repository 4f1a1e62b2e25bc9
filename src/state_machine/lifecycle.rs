//! Campaign lifecycle operations: create, edit, status changes, delete
//!
//! Every write is validated once at the boundary with [`validate`], and
//! status changes are checked by [`CampaignStateMachine`] before a
//! conditional update that fails if another writer got there first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::CampaignStateMachine;
use crate::db;
use crate::domain::{
    validate, AudienceMode, Campaign, CampaignSpec, CampaignStatus, EngineError, EngineResult,
    Target, TargetStatus, Trigger, UpdateCampaignRequest,
};
use crate::targeting;

/// A newly created campaign and the targets its first run produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCampaign {
    pub campaign: Campaign,
    pub created_targets: u64,
}

/// Outcome of a status request; `trigger` is `None` for a same-status no-op
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub campaign: Campaign,
    pub from: CampaignStatus,
    pub trigger: Option<Trigger>,
}

/// Outcome of an edit
#[derive(Debug, Clone)]
pub struct CampaignUpdate {
    pub campaign: Campaign,
    pub fields_changed: bool,
    pub status_change: Option<StatusChange>,
}

async fn load(pool: &SqlitePool, campaign_id: &str) -> EngineResult<Campaign> {
    db::get_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| EngineError::campaign_not_found(campaign_id))
}

/// Validate and persist a campaign. Targeted campaigns get their first
/// targeting run immediately.
pub async fn create_campaign(pool: &SqlitePool, spec: CampaignSpec) -> EngineResult<CreatedCampaign> {
    let now = Utc::now();
    let normalized = validate(spec, now)?;
    let id = Uuid::new_v4().to_string();

    let campaign = db::insert_campaign(pool, &id, &normalized, now).await?;
    tracing::info!(
        campaign_id = %campaign.id,
        audience_mode = %campaign.audience_mode.as_str(),
        status = %campaign.status,
        "Campaign created"
    );

    if campaign.audience_mode == AudienceMode::Public {
        return Ok(CreatedCampaign {
            campaign,
            created_targets: 0,
        });
    }

    let refresh = targeting::refresh_campaign(pool, &campaign, false, now).await?;
    let campaign = load(pool, &id).await?;

    Ok(CreatedCampaign {
        campaign,
        created_targets: refresh.created_count,
    })
}

pub async fn get_campaign(pool: &SqlitePool, campaign_id: &str) -> EngineResult<Campaign> {
    load(pool, campaign_id).await
}

pub async fn list_campaigns(
    pool: &SqlitePool,
    status: Option<CampaignStatus>,
) -> EngineResult<Vec<Campaign>> {
    Ok(db::list_campaigns(pool, status).await?)
}

/// Move a campaign to `new_status`.
///
/// Asking for the current status is accepted and changes nothing.
pub async fn set_status(
    pool: &SqlitePool,
    campaign_id: &str,
    new_status: CampaignStatus,
) -> EngineResult<StatusChange> {
    set_status_at(pool, campaign_id, new_status, Utc::now()).await
}

async fn set_status_at(
    pool: &SqlitePool,
    campaign_id: &str,
    new_status: CampaignStatus,
    now: DateTime<Utc>,
) -> EngineResult<StatusChange> {
    let campaign = load(pool, campaign_id).await?;
    let from = campaign.status;

    let Some(trigger) = CampaignStateMachine::new().check(from, new_status)? else {
        return Ok(StatusChange {
            campaign,
            from,
            trigger: None,
        });
    };

    if !db::update_campaign_status(pool, campaign_id, from, new_status, now).await? {
        return Err(EngineError::Conflict(format!(
            "Campaign {} changed status concurrently; expected {}",
            campaign_id, from
        )));
    }

    tracing::info!(
        campaign_id = %campaign_id,
        from = %from,
        to = %new_status,
        trigger = %trigger,
        "Campaign status changed"
    );

    Ok(StatusChange {
        campaign: load(pool, campaign_id).await?,
        from,
        trigger: Some(trigger),
    })
}

/// Edit a campaign's fields and optionally its status.
///
/// The patch is merged onto the stored campaign and the merged spec is
/// validated as a whole. Finished and cancelled campaigns are read-only.
pub async fn update_campaign(
    pool: &SqlitePool,
    campaign_id: &str,
    patch: UpdateCampaignRequest,
) -> EngineResult<CampaignUpdate> {
    let now = Utc::now();
    let mut campaign = load(pool, campaign_id).await?;
    let fields_changed = patch.has_field_changes();

    if fields_changed {
        if campaign.status.is_terminal() {
            return Err(EngineError::precondition(format!(
                "Campaign is {} and can no longer be edited",
                campaign.status
            )));
        }

        let merged = patch.apply_to(campaign.to_spec());
        let normalized = validate(merged, now)?;

        if !db::update_campaign_fields(pool, campaign_id, &normalized, now).await? {
            return Err(EngineError::Conflict(format!(
                "Campaign {} was closed while being edited",
                campaign_id
            )));
        }
        campaign = load(pool, campaign_id).await?;
        tracing::info!(campaign_id = %campaign_id, "Campaign updated");
    }

    let status_change = match patch.status {
        Some(status) => {
            let change = set_status_at(pool, campaign_id, status, now).await?;
            campaign = change.campaign.clone();
            Some(change)
        }
        None => None,
    };

    Ok(CampaignUpdate {
        campaign,
        fields_changed,
        status_change,
    })
}

/// Delete a campaign with everything attached to it.
///
/// Refused while any of its messages is waiting or being sent.
pub async fn delete_campaign(pool: &SqlitePool, campaign_id: &str) -> EngineResult<()> {
    load(pool, campaign_id).await?;

    if !db::delete_campaign_if_idle(pool, campaign_id).await? {
        return Err(EngineError::precondition(
            "Campaign has pending or in-flight messages; cancel it instead",
        ));
    }

    tracing::info!(campaign_id = %campaign_id, "Campaign deleted");
    Ok(())
}

/// Exclude a target from further messaging
pub async fn skip_target(pool: &SqlitePool, campaign_id: &str, target_id: &str) -> EngineResult<Target> {
    let target = db::get_target(pool, target_id)
        .await?
        .filter(|t| t.campaign_id == campaign_id)
        .ok_or_else(|| EngineError::target_not_found(target_id))?;

    if target.status == TargetStatus::Skipped {
        return Ok(target);
    }
    CampaignStateMachine::new().check_target(target.status, TargetStatus::Skipped)?;

    if !db::mark_target_skipped(pool, target_id).await? {
        return Err(EngineError::Conflict(format!(
            "Target {} changed status concurrently",
            target_id
        )));
    }

    tracing::info!(campaign_id = %campaign_id, target_id = %target_id, "Target skipped");
    db::get_target(pool, target_id)
        .await?
        .ok_or_else(|| EngineError::target_not_found(target_id))
}
