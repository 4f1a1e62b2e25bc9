//! Funnel tracker: on-site events and order conversion
//!
//! Every event is appended to the log. The per-kind `first_*_at` columns on
//! the target and the conversion itself are conditional updates, so
//! duplicate or concurrent deliveries of the same event are harmless.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db;
use crate::domain::{
    Campaign, EngineError, EngineResult, FunnelKind, FunnelOutcome, Order, RecordEventRequest, Target,
    TargetStatus, ValidationError,
};

/// Result of [`record_event`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event_id: String,
    pub target: Target,
    pub outcome: FunnelOutcome,
}

/// A campaign to show on a storefront page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnsiteCampaign {
    pub campaign: Campaign,
    /// Caller's target, for attributing funnel events
    pub target_id: Option<String>,
}

async fn resolve_target(pool: &SqlitePool, request: &RecordEventRequest) -> EngineResult<Target> {
    if let Some(target_id) = &request.target_id {
        return db::get_target(pool, target_id)
            .await?
            .filter(|t| request.campaign_id.as_ref().map_or(true, |c| *c == t.campaign_id))
            .ok_or_else(|| EngineError::target_not_found(target_id));
    }

    let campaign_id = request
        .campaign_id
        .as_deref()
        .ok_or_else(|| ValidationError::Invalid("targetId or campaignId is required".to_string()))?;
    if request.customer_id.is_none() && request.visitor_id.is_none() {
        return Err(ValidationError::MissingIdentity.into());
    }

    db::find_target_by_identity(
        pool,
        campaign_id,
        request.customer_id.as_deref(),
        request.visitor_id.as_deref(),
    )
    .await?
    .ok_or_else(|| EngineError::NotFound(format!("Target for campaign {}", campaign_id)))
}

/// Whether `order` converts a target of `campaign`
pub fn order_converts(campaign: &Campaign, order: &Order, now: DateTime<Utc>) -> bool {
    let (column, key) = campaign.scope.filter_key();
    campaign.in_window(order.placed_at, now) && order.items.iter().any(|item| item.key(column) == Some(key))
}

/// Customer behind an identity: the customer itself, or the one its visitor is linked to
async fn owning_customer(
    pool: &SqlitePool,
    customer_id: Option<&str>,
    visitor_id: Option<&str>,
) -> EngineResult<Option<String>> {
    if let Some(customer_id) = customer_id {
        return Ok(Some(customer_id.to_string()));
    }
    match visitor_id {
        Some(visitor_id) => Ok(db::resolve_visitor(pool, visitor_id).await?),
        None => Ok(None),
    }
}

/// Whether `order` was placed by the target's recipient
pub async fn order_belongs_to(pool: &SqlitePool, target: &Target, order: &Order) -> EngineResult<bool> {
    if let (Some(order_visitor), Some(target_visitor)) = (&order.visitor_id, &target.visitor_id) {
        if order_visitor == target_visitor {
            return Ok(true);
        }
    }

    let buyer = owning_customer(pool, order.customer_id.as_deref(), order.visitor_id.as_deref()).await?;
    let recipient = owning_customer(pool, target.customer_id.as_deref(), target.visitor_id.as_deref()).await?;
    Ok(matches!((buyer, recipient), (Some(b), Some(r)) if b == r))
}

/// Record a storefront event against a target
pub async fn record_event(pool: &SqlitePool, request: RecordEventRequest) -> EngineResult<RecordedEvent> {
    let order_id = match (request.kind, request.order_id.as_deref().map(str::trim)) {
        (FunnelKind::Order, Some(id)) if !id.is_empty() => Some(id.to_string()),
        (FunnelKind::Order, _) => return Err(ValidationError::MissingOrderId.into()),
        (_, id) => id.filter(|id| !id.is_empty()).map(String::from),
    };

    let target = resolve_target(pool, &request).await?;
    let now = Utc::now();
    let occurred_at = request.occurred_at.unwrap_or(now);

    let event_id = db::insert_funnel_event(
        pool,
        &target.id,
        request.kind,
        occurred_at,
        order_id.as_deref(),
        request.path.as_deref(),
        now,
    )
    .await?;

    let first_occurrence = db::set_first_occurrence(pool, &target.id, request.kind, occurred_at).await?;

    let mut converted = false;
    if let (FunnelKind::Order, Some(order_id)) = (request.kind, order_id.as_deref()) {
        converted = convert(pool, &target, order_id, now).await?;
    }

    tracing::debug!(
        campaign_id = %target.campaign_id,
        target_id = %target.id,
        kind = %request.kind,
        first_occurrence,
        converted,
        "Funnel event recorded"
    );

    let target = db::get_target(pool, &target.id).await?.unwrap_or(target);
    Ok(RecordedEvent {
        event_id,
        target,
        outcome: FunnelOutcome {
            first_occurrence,
            converted,
        },
    })
}

async fn convert(pool: &SqlitePool, target: &Target, order_id: &str, now: DateTime<Utc>) -> EngineResult<bool> {
    if target.status == TargetStatus::Converted {
        return Ok(false);
    }

    let campaign = db::get_campaign(pool, &target.campaign_id)
        .await?
        .ok_or_else(|| EngineError::campaign_not_found(&target.campaign_id))?;

    let Some(order) = db::get_order(pool, order_id).await? else {
        tracing::debug!(order_id = %order_id, "Order not found; no conversion");
        return Ok(false);
    };
    if !order_converts(&campaign, &order, now) {
        return Ok(false);
    }
    if !order_belongs_to(pool, target, &order).await? {
        tracing::debug!(
            target_id = %target.id,
            order_id = %order.id,
            "Order placed by someone else; no conversion"
        );
        return Ok(false);
    }

    let converted = db::mark_target_converted(pool, &target.id, order.placed_at, &order.id).await?;
    if converted {
        tracing::info!(
            campaign_id = %campaign.id,
            target_id = %target.id,
            order_id = %order.id,
            "Target converted"
        );
    }
    Ok(converted)
}

/// Campaigns to show on `path` for the caller.
///
/// Public campaigns show to everyone. Targeted campaigns show only to
/// callers holding a live target.
pub async fn onsite_campaigns(
    pool: &SqlitePool,
    path: &str,
    customer_id: Option<&str>,
    visitor_id: Option<&str>,
) -> EngineResult<Vec<OnsiteCampaign>> {
    let now = Utc::now();
    let mut shown = Vec::new();

    for campaign in db::list_onsite_campaigns(pool).await? {
        if !campaign.in_window(now, now) || !campaign.matches_path(path) {
            continue;
        }

        if campaign.is_public() {
            shown.push(OnsiteCampaign {
                campaign,
                target_id: None,
            });
            continue;
        }

        if customer_id.is_none() && visitor_id.is_none() {
            continue;
        }
        let target = db::find_target_by_identity(pool, &campaign.id, customer_id, visitor_id).await?;
        if let Some(target) = target.filter(|t| t.status.is_messageable()) {
            shown.push(OnsiteCampaign {
                campaign,
                target_id: Some(target.id),
            });
        }
    }

    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_database, insert_campaign, insert_order, insert_targets, link_visitor, upsert_customer};
    use crate::domain::{
        validate, AudienceMode, CampaignScope, CampaignSpec, CampaignStatus, CampaignType, ChannelFlags,
        Customer, NewTarget, OrderItem, Recipient, TargetingConfig,
    };
    use chrono::Duration;

    async fn seed(pool: &SqlitePool, audience_mode: AudienceMode) -> (Campaign, Option<Target>) {
        let now = Utc::now();
        let spec = CampaignSpec {
            name: "Wiper blades".to_string(),
            scope: CampaignScope::Year {
                brand_id: "honda".to_string(),
                model_id: "civic".to_string(),
                year_id: "civic-2018".to_string(),
            },
            campaign_type: CampaignType::Message,
            audience_mode,
            channels: ChannelFlags {
                send_onsite: true,
                send_email: false,
                send_whatsapp: false,
            },
            targeting: TargetingConfig {
                only_customers: false,
                lookback_days: 30,
                min_signals: 1,
            },
            onsite_paths: Some(vec!["/vehicles/*".to_string()]),
            starts_at: Some(now - Duration::days(1)),
            ends_at: None,
            discount_price: None,
            coupon_code: None,
            email_subject: None,
            email_body: None,
            whatsapp_body: None,
            status: Some(CampaignStatus::Active),
        };
        let campaign = insert_campaign(pool, "camp-1", &validate(spec, now).unwrap(), now)
            .await
            .unwrap();
        if audience_mode == AudienceMode::Public {
            return (campaign, None);
        }

        upsert_customer(
            pool,
            &Customer {
                id: "cust-1".to_string(),
                name: "Grace".to_string(),
                email: None,
                phone: None,
                email_opt_out: false,
                whatsapp_opt_out: false,
            },
            now,
        )
        .await
        .unwrap();
        insert_targets(
            pool,
            &campaign.id,
            &[NewTarget {
                recipient: Recipient::Customer("cust-1".to_string()),
                signals_count: 2,
                last_signal_at: now,
            }],
            now,
        )
        .await
        .unwrap();
        let target = db::find_target_by_identity(pool, &campaign.id, Some("cust-1"), None)
            .await
            .unwrap();
        (campaign, target)
    }

    fn event(target_id: &str, kind: FunnelKind, occurred_at: DateTime<Utc>) -> RecordEventRequest {
        RecordEventRequest {
            target_id: Some(target_id.to_string()),
            campaign_id: None,
            customer_id: None,
            visitor_id: None,
            kind,
            occurred_at: Some(occurred_at),
            order_id: None,
            path: Some("/vehicles/honda".to_string()),
        }
    }

    fn order(id: &str, year_id: &str, placed_at: DateTime<Utc>) -> Order {
        Order {
            id: id.to_string(),
            customer_id: Some("cust-1".to_string()),
            visitor_id: None,
            placed_at,
            items: vec![OrderItem {
                product_id: Some("wiper-22".to_string()),
                brand_id: Some("honda".to_string()),
                model_id: Some("civic".to_string()),
                year_id: Some(year_id.to_string()),
            }],
        }
    }

    #[tokio::test]
    async fn test_first_impression_wins() {
        let pool = init_memory_database().await.unwrap();
        let (_, target) = seed(&pool, AudienceMode::Targeted).await;
        let target = target.unwrap();
        let t1 = Utc::now() - Duration::hours(2);
        let t2 = t1 + Duration::hours(1);

        let first = record_event(&pool, event(&target.id, FunnelKind::Impression, t1)).await.unwrap();
        assert!(first.outcome.first_occurrence);

        let second = record_event(&pool, event(&target.id, FunnelKind::Impression, t2)).await.unwrap();
        assert!(!second.outcome.first_occurrence);
        assert_eq!(
            second.target.first_impression_at.unwrap().timestamp_micros(),
            t1.timestamp_micros()
        );
        assert_eq!(db::list_funnel_events(&pool, &target.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_order_event_requires_order_id() {
        let pool = init_memory_database().await.unwrap();
        let (_, target) = seed(&pool, AudienceMode::Targeted).await;

        let err = record_event(&pool, event(&target.unwrap().id, FunnelKind::Order, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::MissingOrderId)));
    }

    #[tokio::test]
    async fn test_matching_order_converts_once() {
        let pool = init_memory_database().await.unwrap();
        let (_, target) = seed(&pool, AudienceMode::Targeted).await;
        let target = target.unwrap();
        let now = Utc::now();

        insert_order(&pool, &order("ord-1", "civic-2018", now)).await.unwrap();
        insert_order(&pool, &order("ord-2", "civic-2018", now)).await.unwrap();

        let mut req = event(&target.id, FunnelKind::Order, now);
        req.order_id = Some("ord-1".to_string());
        let recorded = record_event(&pool, req).await.unwrap();
        assert!(recorded.outcome.converted);
        assert_eq!(recorded.target.status, TargetStatus::Converted);
        assert_eq!(recorded.target.conversion_order_id.as_deref(), Some("ord-1"));

        let mut req = event(&target.id, FunnelKind::Order, now);
        req.order_id = Some("ord-2".to_string());
        let recorded = record_event(&pool, req).await.unwrap();
        assert!(!recorded.outcome.converted);
        assert_eq!(recorded.target.conversion_order_id.as_deref(), Some("ord-1"));
    }

    #[tokio::test]
    async fn test_order_outside_scope_or_window_does_not_convert() {
        let pool = init_memory_database().await.unwrap();
        let (campaign, target) = seed(&pool, AudienceMode::Targeted).await;
        let target = target.unwrap();
        let now = Utc::now();

        assert!(!order_converts(&campaign, &order("x", "civic-2019", now), now));
        assert!(!order_converts(
            &campaign,
            &order("y", "civic-2018", now - Duration::days(3)),
            now
        ));
        assert!(order_converts(&campaign, &order("z", "civic-2018", now), now));

        insert_order(&pool, &order("ord-9", "civic-2019", now)).await.unwrap();
        let mut req = event(&target.id, FunnelKind::Order, now);
        req.order_id = Some("ord-9".to_string());
        let recorded = record_event(&pool, req).await.unwrap();
        assert!(!recorded.outcome.converted);
        assert!(recorded.outcome.first_occurrence);
        assert_eq!(recorded.target.status, TargetStatus::Pending);
    }

    #[tokio::test]
    async fn test_order_after_campaign_end_does_not_convert() {
        let pool = init_memory_database().await.unwrap();
        let (mut campaign, _) = seed(&pool, AudienceMode::Targeted).await;
        let now = Utc::now();
        campaign.ends_at = Some(now - Duration::hours(2));

        assert!(!order_converts(&campaign, &order("late", "civic-2018", now - Duration::hours(1)), now));
        assert!(!order_converts(&campaign, &order("now", "civic-2018", now), now));
        assert!(order_converts(&campaign, &order("inside", "civic-2018", now - Duration::hours(3)), now));
        assert!(order_converts(&campaign, &order("edge", "civic-2018", now - Duration::hours(2)), now));
    }

    #[tokio::test]
    async fn test_order_by_someone_else_does_not_convert() {
        let pool = init_memory_database().await.unwrap();
        let (_, target) = seed(&pool, AudienceMode::Targeted).await;
        let target = target.unwrap();
        let now = Utc::now();

        let mut foreign = order("ord-other", "civic-2018", now);
        foreign.customer_id = Some("cust-2".to_string());
        insert_order(&pool, &foreign).await.unwrap();
        assert!(!order_belongs_to(&pool, &target, &foreign).await.unwrap());

        let mut req = event(&target.id, FunnelKind::Order, now);
        req.order_id = Some("ord-other".to_string());
        let recorded = record_event(&pool, req).await.unwrap();
        assert!(!recorded.outcome.converted);
        assert_eq!(recorded.target.status, TargetStatus::Pending);
        assert!(recorded.target.conversion_order_id.is_none());

        // An anonymous order converts once its visitor is linked to the customer
        let mut anonymous = order("ord-anon", "civic-2018", now);
        anonymous.customer_id = None;
        anonymous.visitor_id = Some("vis-9".to_string());
        insert_order(&pool, &anonymous).await.unwrap();
        assert!(!order_belongs_to(&pool, &target, &anonymous).await.unwrap());

        link_visitor(&pool, "vis-9", "cust-1", now).await.unwrap();
        let mut req = event(&target.id, FunnelKind::Order, now);
        req.order_id = Some("ord-anon".to_string());
        let recorded = record_event(&pool, req).await.unwrap();
        assert!(recorded.outcome.converted);
        assert_eq!(recorded.target.conversion_order_id.as_deref(), Some("ord-anon"));
    }

    #[tokio::test]
    async fn test_event_by_linked_visitor() {
        let pool = init_memory_database().await.unwrap();
        let (campaign, target) = seed(&pool, AudienceMode::Targeted).await;
        link_visitor(&pool, "vis-1", "cust-1", Utc::now()).await.unwrap();

        let req = RecordEventRequest {
            target_id: None,
            campaign_id: Some(campaign.id.clone()),
            customer_id: None,
            visitor_id: Some("vis-1".to_string()),
            kind: FunnelKind::Click,
            occurred_at: None,
            order_id: None,
            path: None,
        };
        let recorded = record_event(&pool, req).await.unwrap();
        assert_eq!(recorded.target.id, target.unwrap().id);
        assert!(recorded.target.first_click_at.is_some());
    }

    #[tokio::test]
    async fn test_onsite_eligibility() {
        let pool = init_memory_database().await.unwrap();
        let (_, target) = seed(&pool, AudienceMode::Targeted).await;

        let shown = onsite_campaigns(&pool, "/vehicles/honda/civic", Some("cust-1"), None)
            .await
            .unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].target_id, target.map(|t| t.id));

        assert!(onsite_campaigns(&pool, "/vehicles/honda", Some("stranger"), None)
            .await
            .unwrap()
            .is_empty());
        assert!(onsite_campaigns(&pool, "/cart", Some("cust-1"), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_public_campaign_shows_to_anyone() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool, AudienceMode::Public).await;

        let shown = onsite_campaigns(&pool, "/vehicles", None, None).await.unwrap();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].target_id.is_none());
    }
}
