//! Targeting engine: turns recent interest signals into campaign targets
//!
//! Runs are additive. A recipient admitted once keeps its target row, and
//! repeated or concurrent runs only ever add recipients the campaign does not
//! have yet. Duplicate suppression is left to the unique indexes on
//! `targets`, not to locking here.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::db;
use crate::domain::{
    Campaign, EngineError, EngineResult, NewTarget, Recipient, RefreshResult, SignalAggregate,
    TargetingConfig,
};

/// Decide which signal groups become targets.
///
/// Keeps groups with at least `min_signals` matching signals, drops
/// anonymous groups when `only_customers` is set, and when `new_since` is
/// given keeps only recipients whose first matching signal came after it.
pub fn admit(
    groups: Vec<SignalAggregate>,
    targeting: &TargetingConfig,
    new_since: Option<DateTime<Utc>>,
) -> Vec<NewTarget> {
    groups
        .into_iter()
        .filter(|g| g.signals_count >= targeting.min_signals)
        .filter(|g| new_since.map_or(true, |since| g.first_signal_at > since))
        .filter_map(|g| {
            let recipient = match (g.customer_id, g.visitor_id) {
                (Some(customer_id), _) => Recipient::Customer(customer_id),
                (None, Some(_)) if targeting.only_customers => return None,
                (None, Some(visitor_id)) => Recipient::Visitor(visitor_id),
                (None, None) => return None,
            };
            Some(NewTarget {
                recipient,
                signals_count: g.signals_count,
                last_signal_at: g.last_signal_at,
            })
        })
        .collect()
}

/// Reject campaigns that cannot have targets
fn ensure_targetable(campaign: &Campaign) -> EngineResult<()> {
    if campaign.is_public() {
        return Err(EngineError::precondition(
            "Public campaigns reach every visitor and have no targets",
        ));
    }
    if campaign.status.is_terminal() {
        return Err(EngineError::precondition(format!(
            "Campaign is {} and can no longer gain targets",
            campaign.status
        )));
    }
    Ok(())
}

/// Build the target list, or extend it with recipients that newly qualify
pub async fn build_or_refresh_targets(pool: &SqlitePool, campaign_id: &str) -> EngineResult<RefreshResult> {
    run(pool, campaign_id, false, Utc::now()).await
}

/// Add only recipients whose first qualifying signal came after the last run
pub async fn attach_new_viewers(pool: &SqlitePool, campaign_id: &str) -> EngineResult<RefreshResult> {
    run(pool, campaign_id, true, Utc::now()).await
}

pub(crate) async fn refresh_campaign(
    pool: &SqlitePool,
    campaign: &Campaign,
    new_viewers_only: bool,
    now: DateTime<Utc>,
) -> EngineResult<RefreshResult> {
    ensure_targetable(campaign)?;

    let (column, key) = campaign.scope.filter_key();
    let since = now - Duration::days(campaign.targeting.lookback_days);
    let groups = db::aggregate_signals(pool, column, key, since).await?;
    let group_count = groups.len();

    let new_since = if new_viewers_only {
        campaign.last_refreshed_at
    } else {
        None
    };
    let admitted = admit(groups, &campaign.targeting, new_since);

    let created_count = db::insert_targets(pool, &campaign.id, &admitted, now).await?;
    db::set_last_refreshed(pool, &campaign.id, now).await?;

    tracing::info!(
        campaign_id = %campaign.id,
        scope = %campaign.scope.kind(),
        groups = group_count,
        admitted = admitted.len(),
        created = created_count,
        new_viewers_only,
        "Targeting run complete"
    );

    Ok(RefreshResult { created_count })
}

async fn run(
    pool: &SqlitePool,
    campaign_id: &str,
    new_viewers_only: bool,
    now: DateTime<Utc>,
) -> EngineResult<RefreshResult> {
    let campaign = db::get_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| EngineError::campaign_not_found(campaign_id))?;

    refresh_campaign(pool, &campaign, new_viewers_only, now).await
}
