//! Message building and dispatch against a mocked email provider

use outreach::config::Config;
use outreach::db;
use outreach::domain::{Channel, MessageStatus, TargetStatus};
use outreach::integrations::Transports;
use outreach::messaging::{build_messages, reset_failed_messages, Dispatcher};
use outreach::reports::message_summary;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn email_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.email.api_url = Some(format!("{}/send", server.uri()));
    config.email.api_key = Some("test-key".to_string());
    config.storefront.base_url = "https://shop.example.com".to_string();
    config
}

async fn seed(pool: &SqlitePool, customers: &[(&str, Option<&str>, Option<&str>)]) {
    for (id, email, phone) in customers {
        add_customer(pool, id, *email, *phone).await;
        add_signal(pool, Some(id), None, PRODUCT, days_ago(1)).await;
    }
}

#[tokio::test]
async fn test_one_job_per_target_and_channel() {
    let pool = memory_pool().await;
    seed(
        &pool,
        &[
            ("cust-1", Some("one@example.com"), Some("+15550001")),
            ("cust-2", Some("two@example.com"), None),
            ("cust-3", None, Some("+15550003")),
        ],
    )
    .await;

    let created = create_active(&pool, targeted_spec(email_and_whatsapp(), 7, 1)).await;
    let campaign_id = created.campaign.id;

    let first = build_messages(&pool, &campaign_id).await.unwrap();
    assert_eq!(first.created_email, 2);
    assert_eq!(first.created_whatsapp, 2);

    let second = build_messages(&pool, &campaign_id).await.unwrap();
    assert_eq!(second.created_email, 0);
    assert_eq!(second.created_whatsapp, 0);

    let messages = db::list_campaign_messages(&pool, &campaign_id).await.unwrap();
    assert_eq!(messages.len(), 4);
    let mut keys: Vec<(String, Channel)> = messages
        .iter()
        .map(|m| (m.target_id.clone(), m.channel))
        .collect();
    keys.sort_by(|a, b| (&a.0, a.1.as_str()).cmp(&(&b.0, b.1.as_str())));
    keys.dedup();
    assert_eq!(keys.len(), 4);
    assert!(messages.iter().all(|m| m.status == MessageStatus::Pending));
}

#[tokio::test]
async fn test_dispatch_delivers_through_the_email_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(serde_json::json!({ "to": [{ "email": "bounce@example.com" }] })))
        .respond_with(ResponseTemplate::new(500).set_body_string("mailbox unavailable"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "prov-1" })))
        .with_priority(2)
        .mount(&server)
        .await;

    let pool = memory_pool().await;
    seed(
        &pool,
        &[
            ("cust-1", Some("one@example.com"), None),
            ("cust-2", Some("bounce@example.com"), None),
        ],
    )
    .await;
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    let campaign_id = created.campaign.id;
    build_messages(&pool, &campaign_id).await.unwrap();

    let config = email_config(&server);
    let dispatcher = Dispatcher::from_config(pool.clone(), Transports::from_config(&config), &config);

    let result = dispatcher.dispatch(Channel::Email).await.unwrap();
    assert_eq!(result.sent, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.skipped, 0);

    let messages = db::list_campaign_messages(&pool, &campaign_id).await.unwrap();
    let sent = messages.iter().find(|m| m.status == MessageStatus::Sent).unwrap();
    assert_eq!(sent.provider_message_id.as_deref(), Some("prov-1"));
    assert!(sent.sent_at.is_some());
    let failed = messages.iter().find(|m| m.status == MessageStatus::Failed).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("500"));

    let sent_target = db::get_target(&pool, &sent.target_id).await.unwrap().unwrap();
    assert_eq!(sent_target.status, TargetStatus::Notified);
    assert!(sent_target.notified_at.is_some());
    let failed_target = db::get_target(&pool, &failed.target_id).await.unwrap().unwrap();
    assert_eq!(failed_target.status, TargetStatus::Pending);

    // Nothing left to claim
    let idle = dispatcher.dispatch(Channel::Email).await.unwrap();
    assert_eq!((idle.sent, idle.failed, idle.skipped), (0, 0, 0));

    // Failed jobs only go back to the queue on request
    let reset = reset_failed_messages(&pool, &campaign_id, Some(Channel::Email)).await.unwrap();
    assert_eq!(reset.reset, 1);
    let summary = message_summary(&pool, &campaign_id).await.unwrap();
    assert_eq!(summary.email.pending, 1);
    assert_eq!(summary.email.sent, 1);
    assert_eq!(summary.email.failed, 0);
}

#[tokio::test]
async fn test_unconfigured_channel_leaves_jobs_queued() {
    let pool = memory_pool().await;
    seed(&pool, &[("cust-1", Some("one@example.com"), Some("+15550001"))]).await;
    let created = create_active(&pool, targeted_spec(email_and_whatsapp(), 7, 1)).await;
    build_messages(&pool, &created.campaign.id).await.unwrap();

    let config = Config::default();
    let dispatcher = Dispatcher::from_config(pool.clone(), Transports::from_config(&config), &config);

    let result = dispatcher.dispatch(Channel::Whatsapp).await.unwrap();
    assert_eq!((result.sent, result.failed, result.skipped), (0, 0, 1));

    let summary = message_summary(&pool, &created.campaign.id).await.unwrap();
    assert_eq!(summary.whatsapp.pending, 1);
    assert_eq!(summary.email.pending, 1);
}
