//! Funnel events, conversion and the resulting report

use chrono::Utc;
use outreach::domain::{
    FunnelKind, Order, OrderItem, RecordEventRequest, ReportWindow, TargetListParams, TargetStatus,
};
use outreach::funnel::{onsite_campaigns, record_event};
use outreach::ingest;
use outreach::reports::{list_targets, report};
use outreach::state_machine::skip_target;

use super::*;

fn event(campaign_id: &str, customer_id: &str, kind: FunnelKind, order_id: Option<&str>) -> RecordEventRequest {
    RecordEventRequest {
        target_id: None,
        campaign_id: Some(campaign_id.to_string()),
        customer_id: Some(customer_id.to_string()),
        visitor_id: None,
        kind,
        occurred_at: None,
        order_id: order_id.map(String::from),
        path: Some(format!("/products/{}", PRODUCT)),
    }
}

async fn place_order(pool: &SqlitePool, id: &str, customer_id: &str, product_id: &str) {
    ingest::record_order(
        pool,
        Order {
            id: id.to_string(),
            customer_id: Some(customer_id.to_string()),
            visitor_id: None,
            placed_at: Utc::now(),
            items: vec![OrderItem {
                product_id: Some(product_id.to_string()),
                ..Default::default()
            }],
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_first_qualifying_order_converts_once() {
    let pool = memory_pool().await;
    for customer in ["cust-1", "cust-2"] {
        add_customer(&pool, customer, Some(&format!("{}@example.com", customer)), None).await;
        add_signal(&pool, Some(customer), None, PRODUCT, days_ago(1)).await;
    }
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    let campaign_id = created.campaign.id;

    let seen = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Impression, None))
        .await
        .unwrap();
    assert!(seen.outcome.first_occurrence);
    let seen_again = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Impression, None))
        .await
        .unwrap();
    assert!(!seen_again.outcome.first_occurrence);

    record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Click, None))
        .await
        .unwrap();

    // An order for something else does not convert
    place_order(&pool, "order-0", "cust-1", "pads-9").await;
    let unrelated = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Order, Some("order-0")))
        .await
        .unwrap();
    assert!(!unrelated.outcome.converted);

    place_order(&pool, "order-1", "cust-1", PRODUCT).await;
    let converted = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Order, Some("order-1")))
        .await
        .unwrap();
    assert!(converted.outcome.converted);
    assert_eq!(converted.target.status, TargetStatus::Converted);
    let converted_at = converted.target.converted_at.unwrap();

    place_order(&pool, "order-2", "cust-1", PRODUCT).await;
    let later = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Order, Some("order-2")))
        .await
        .unwrap();
    assert!(!later.outcome.converted);
    assert_eq!(later.target.conversion_order_id.as_deref(), Some("order-1"));
    assert_eq!(
        later.target.converted_at.unwrap().timestamp_micros(),
        converted_at.timestamp_micros()
    );

    // Converted is final
    assert!(skip_target(&pool, &campaign_id, &later.target.id).await.is_err());

    let report = report(&pool, &campaign_id, ReportWindow::SinceStart, None, None)
        .await
        .unwrap();
    assert_eq!(report.total_targets, 2);
    assert_eq!(report.converted_count, 1);
    assert_eq!(report.onsite_seen_count, 1);
    assert_eq!(report.clicked_count, 1);
    assert!((report.conversion_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(report.targets_by_status.converted, 1);
    assert_eq!(report.targets_by_status.pending, 1);
}

#[tokio::test]
async fn test_order_event_requires_an_order_id() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-1", Some("one@example.com"), None).await;
    add_signal(&pool, Some("cust-1"), None, PRODUCT, days_ago(1)).await;
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;

    let err = record_event(&pool, event(&created.campaign.id, "cust-1", FunnelKind::Order, None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("orderId"));

    let page = list_targets(&pool, &created.campaign.id, TargetListParams::default())
        .await
        .unwrap();
    assert!(page.items[0].target.first_order_at.is_none());
}

#[tokio::test]
async fn test_onsite_lookup_shows_targeted_campaigns_only_to_targets() {
    let pool = memory_pool().await;
    add_customer(&pool, "cust-1", Some("one@example.com"), None).await;
    add_customer(&pool, "cust-2", Some("two@example.com"), None).await;
    add_signal(&pool, Some("cust-1"), None, PRODUCT, days_ago(1)).await;

    let mut spec = targeted_spec(email_and_whatsapp(), 7, 1);
    spec.onsite_paths = Some(vec!["/products/*".to_string()]);
    let created = create_active(&pool, spec).await;

    let path = format!("/products/{}", PRODUCT);
    let for_target = onsite_campaigns(&pool, &path, Some("cust-1"), None).await.unwrap();
    assert_eq!(for_target.len(), 1);
    assert_eq!(for_target[0].campaign.id, created.campaign.id);
    assert!(for_target[0].target_id.is_some());

    let for_other = onsite_campaigns(&pool, &path, Some("cust-2"), None).await.unwrap();
    assert!(for_other.is_empty());

    let off_path = onsite_campaigns(&pool, "/cart", Some("cust-1"), None).await.unwrap();
    assert!(off_path.is_empty());
}

#[tokio::test]
async fn test_order_from_another_customer_is_not_attributed() {
    let pool = memory_pool().await;
    for customer in ["cust-1", "cust-2"] {
        add_customer(&pool, customer, Some(&format!("{}@example.com", customer)), None).await;
    }
    add_signal(&pool, Some("cust-1"), None, PRODUCT, days_ago(1)).await;
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    let campaign_id = created.campaign.id;

    place_order(&pool, "order-x", "cust-2", PRODUCT).await;
    let recorded = record_event(&pool, event(&campaign_id, "cust-1", FunnelKind::Order, Some("order-x")))
        .await
        .unwrap();
    assert!(!recorded.outcome.converted);
    assert_eq!(recorded.target.status, TargetStatus::Pending);

    let report = report(&pool, &campaign_id, ReportWindow::SinceStart, None, None)
        .await
        .unwrap();
    assert_eq!(report.converted_count, 0);
}
