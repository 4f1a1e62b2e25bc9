//! Audience selection scenarios

use outreach::domain::{
    AudienceMode, CampaignScope, CampaignSpec, CampaignStatus, ChannelFlags, EngineError,
    TargetListParams, VisitorLink,
};
use outreach::reports::list_targets;
use outreach::state_machine::{create_campaign, set_status};
use outreach::{ingest, targeting};

use super::*;

#[tokio::test]
async fn test_min_signals_and_lookback_select_the_audience() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-a", Some("a@example.com"), None).await;
    add_customer(&pool, "cust-b", Some("b@example.com"), None).await;
    add_customer(&pool, "cust-c", Some("c@example.com"), None).await;

    // A: two recent views, admitted
    add_signal(&pool, Some("cust-a"), None, PRODUCT, days_ago(1)).await;
    add_signal(&pool, Some("cust-a"), None, PRODUCT, days_ago(2)).await;
    // B: one view, below min_signals
    add_signal(&pool, Some("cust-b"), None, PRODUCT, days_ago(1)).await;
    // C: enough views, all outside the lookback
    for days in [10, 11, 12] {
        add_signal(&pool, Some("cust-c"), None, PRODUCT, days_ago(days)).await;
    }
    // Anonymous visitor with enough views is dropped for customer-only targeting
    add_signal(&pool, None, Some("vis-1"), PRODUCT, days_ago(1)).await;
    add_signal(&pool, None, Some("vis-1"), PRODUCT, days_ago(1)).await;
    // Views of another product never count
    add_signal(&pool, Some("cust-b"), None, "pads-9", days_ago(1)).await;

    let created = create_active(&pool, targeted_spec(email_only(), 7, 2)).await;
    assert_eq!(created.created_targets, 1);

    let page = list_targets(&pool, &created.campaign.id, TargetListParams::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].target.customer_id.as_deref(), Some("cust-a"));
    assert_eq!(page.items[0].target.signals_count, 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_linked_visitor_views_count_for_the_customer() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-b", Some("b@example.com"), None).await;
    add_signal(&pool, Some("cust-b"), None, PRODUCT, days_ago(1)).await;
    add_signal(&pool, None, Some("vis-7"), PRODUCT, days_ago(3)).await;

    ingest::link_visitor(
        &pool,
        VisitorLink {
            visitor_id: "vis-7".to_string(),
            customer_id: "cust-b".to_string(),
        },
    )
    .await
    .unwrap();

    let created = create_active(&pool, targeted_spec(email_only(), 7, 2)).await;
    assert_eq!(created.created_targets, 1);

    let page = list_targets(&pool, &created.campaign.id, TargetListParams::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].target.customer_id.as_deref(), Some("cust-b"));
    assert_eq!(page.items[0].target.visitor_id, None);
    assert_eq!(page.items[0].target.signals_count, 2);
}

#[tokio::test]
async fn test_refresh_is_idempotent_and_picks_up_new_viewers() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-a", Some("a@example.com"), None).await;
    add_customer(&pool, "cust-b", Some("b@example.com"), None).await;
    add_signal(&pool, Some("cust-a"), None, PRODUCT, days_ago(1)).await;

    let created = create_active(&pool, targeted_spec(email_only(), 30, 1)).await;
    let campaign_id = created.campaign.id.clone();
    assert_eq!(created.created_targets, 1);

    let again = tokio_test::assert_ok!(targeting::build_or_refresh_targets(&pool, &campaign_id).await);
    assert_eq!(again.created_count, 0);

    add_signal(&pool, Some("cust-b"), None, PRODUCT, chrono::Utc::now()).await;
    let attached = targeting::attach_new_viewers(&pool, &campaign_id).await.unwrap();
    assert_eq!(attached.created_count, 1);

    let page = list_targets(&pool, &campaign_id, TargetListParams::default()).await.unwrap();
    assert_eq!(page.items.len(), 2);
}

#[tokio::test]
async fn test_public_campaign_never_has_targets() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-a", Some("a@example.com"), None).await;
    add_signal(&pool, Some("cust-a"), None, "bmw", days_ago(1)).await;

    let spec = CampaignSpec {
        scope: CampaignScope::Brand {
            brand_id: "bmw".to_string(),
        },
        audience_mode: AudienceMode::Public,
        channels: ChannelFlags {
            send_onsite: false,
            send_email: true,
            send_whatsapp: true,
        },
        ..targeted_spec(email_only(), 30, 1)
    };

    let created = create_campaign(&pool, spec).await.unwrap();
    assert_eq!(created.created_targets, 0);
    assert!(created.campaign.channels.send_onsite);
    assert!(!created.campaign.channels.send_email);
    assert!(!created.campaign.channels.send_whatsapp);

    let err = targeting::build_or_refresh_targets(&pool, &created.campaign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));

    let page = list_targets(&pool, &created.campaign.id, TargetListParams::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_finished_campaign_gains_no_targets() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-a", Some("a@example.com"), None).await;

    let created = create_active(&pool, targeted_spec(email_only(), 30, 1)).await;
    set_status(&pool, &created.campaign.id, CampaignStatus::Finished)
        .await
        .unwrap();

    add_signal(&pool, Some("cust-a"), None, PRODUCT, days_ago(1)).await;
    let err = targeting::build_or_refresh_targets(&pool, &created.campaign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[tokio::test]
async fn test_target_pages_follow_the_cursor() {
    let pool = memory_pool().await;
    for customer in ["cust-1", "cust-2", "cust-3"] {
        add_customer(&pool, customer, Some(&format!("{}@example.com", customer)), None).await;
        add_signal(&pool, Some(customer), None, PRODUCT, days_ago(1)).await;
    }
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    assert_eq!(created.created_targets, 3);

    let first = list_targets(
        &pool,
        &created.campaign.id,
        TargetListParams {
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(first.items.len(), 2);
    let cursor = first.next_cursor.clone().expect("more targets");

    let second = list_targets(
        &pool,
        &created.campaign.id,
        TargetListParams {
            limit: Some(2),
            cursor: Some(cursor),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let mut seen: Vec<String> = first
        .items
        .iter()
        .chain(second.items.iter())
        .filter_map(|v| v.target.customer_id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["cust-1", "cust-2", "cust-3"]);
}

#[tokio::test]
async fn test_second_signal_admits_the_late_customer() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-a", Some("a@example.com"), None).await;
    add_customer(&pool, "cust-b", Some("b@example.com"), None).await;
    for days in [1, 3, 5] {
        add_signal(&pool, Some("cust-a"), None, PRODUCT, days_ago(days)).await;
    }
    add_signal(&pool, Some("cust-b"), None, PRODUCT, days_ago(2)).await;

    let created = create_active(&pool, targeted_spec(email_only(), 7, 2)).await;
    let campaign_id = created.campaign.id.clone();
    assert_eq!(created.created_targets, 1);

    let before = list_targets(&pool, &campaign_id, TargetListParams::default()).await.unwrap();
    let a_before = before.items[0].target.clone();
    assert_eq!(a_before.customer_id.as_deref(), Some("cust-a"));
    assert_eq!(a_before.signals_count, 3);

    add_signal(&pool, Some("cust-b"), None, PRODUCT, days_ago(1)).await;
    let refreshed = targeting::build_or_refresh_targets(&pool, &campaign_id).await.unwrap();
    assert_eq!(refreshed.created_count, 1);

    let after = list_targets(&pool, &campaign_id, TargetListParams::default()).await.unwrap();
    assert_eq!(after.items.len(), 2);
    let a_after = after
        .items
        .iter()
        .find(|v| v.target.customer_id.as_deref() == Some("cust-a"))
        .unwrap();
    assert_eq!(a_after.target.id, a_before.id);
    assert_eq!(a_after.target.signals_count, 3);
    assert_eq!(
        a_after.target.created_at.timestamp_micros(),
        a_before.created_at.timestamp_micros()
    );
}

#[tokio::test]
async fn test_linking_a_targeted_visitor_keeps_one_target() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-1", Some("one@example.com"), None).await;
    add_signal(&pool, None, Some("vis-1"), PRODUCT, days_ago(2)).await;
    add_signal(&pool, None, Some("vis-1"), PRODUCT, days_ago(1)).await;

    let mut spec = targeted_spec(
        ChannelFlags {
            send_onsite: true,
            send_email: false,
            send_whatsapp: false,
        },
        7,
        2,
    );
    spec.targeting.only_customers = false;
    let created = create_active(&pool, spec).await;
    let campaign_id = created.campaign.id.clone();
    assert_eq!(created.created_targets, 1);

    ingest::link_visitor(
        &pool,
        VisitorLink {
            visitor_id: "vis-1".to_string(),
            customer_id: "cust-1".to_string(),
        },
    )
    .await
    .unwrap();

    let refreshed = targeting::build_or_refresh_targets(&pool, &campaign_id).await.unwrap();
    assert_eq!(refreshed.created_count, 0);

    let page = list_targets(&pool, &campaign_id, TargetListParams::default()).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].target.visitor_id.as_deref(), Some("vis-1"));
}
