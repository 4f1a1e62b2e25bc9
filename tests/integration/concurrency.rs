//! Concurrent writers against a file-backed database

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use outreach::config::Config;
use outreach::domain::{Channel, TargetListParams};
use outreach::integrations::{ChannelTransport, DeliveryReceipt, IntegrationError, OutboundMessage, Transports};
use outreach::messaging::{build_messages, Dispatcher};
use outreach::reports::{list_targets, message_summary};
use outreach::targeting;

use super::*;

/// Email transport that counts deliveries per message id
#[derive(Default)]
struct CountingTransport {
    deliveries: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl ChannelTransport for CountingTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, IntegrationError> {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        *self
            .deliveries
            .lock()
            .unwrap()
            .entry(message.message_id.clone())
            .or_default() += 1;
        Ok(DeliveryReceipt::default())
    }
}

#[tokio::test]
async fn test_concurrent_refreshes_never_duplicate_targets() {
    let (_dir, pool) = file_pool().await;
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    let campaign_id = created.campaign.id.clone();
    assert_eq!(created.created_targets, 0);

    for i in 0..20 {
        let id = format!("cust-{}", i);
        add_customer(&pool, &id, Some(&format!("{}@example.com", id)), None).await;
        add_signal(&pool, Some(&id), None, PRODUCT, days_ago(1)).await;
    }

    let runs = futures::future::join_all((0..4).map(|_| {
        let pool = pool.clone();
        let campaign_id = campaign_id.clone();
        async move { targeting::build_or_refresh_targets(&pool, &campaign_id).await }
    }))
    .await;
    let created_total: u64 = runs.into_iter().map(|run| run.unwrap().created_count).sum();
    assert_eq!(created_total, 20);

    let page = list_targets(
        &pool,
        &campaign_id,
        TargetListParams {
            limit: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 20);
}

#[tokio::test]
async fn test_parallel_dispatchers_send_each_job_once() {
    let (_dir, pool) = file_pool().await;
    for i in 0..30 {
        let id = format!("cust-{}", i);
        add_customer(&pool, &id, Some(&format!("{}@example.com", id)), None).await;
        add_signal(&pool, Some(&id), None, PRODUCT, days_ago(1)).await;
    }
    let created = create_active(&pool, targeted_spec(email_only(), 7, 1)).await;
    let campaign_id = created.campaign.id;
    let built = build_messages(&pool, &campaign_id).await.unwrap();
    assert_eq!(built.created_email, 30);

    let transport = Arc::new(CountingTransport::default());
    let mut config = Config::default();
    config.dispatch.batch_limit = 10;

    // Separate dispatchers hold separate locks, so only the row claim keeps them apart
    let dispatchers: Vec<Dispatcher> = (0..3)
        .map(|_| {
            Dispatcher::from_config(
                pool.clone(),
                Transports::new().with(transport.clone()),
                &config,
            )
        })
        .collect();

    let mut sent = 0;
    for _ in 0..3 {
        let results = futures::future::join_all(dispatchers.iter().map(|d| d.dispatch(Channel::Email))).await;
        for result in results {
            let result = result.unwrap();
            assert_eq!(result.failed, 0);
            sent += result.sent;
        }
    }
    assert_eq!(sent, 30);

    let deliveries = transport.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 30);
    assert!(deliveries.values().all(|&count| count == 1));

    let summary = message_summary(&pool, &campaign_id).await.unwrap();
    assert_eq!(summary.email.sent, 30);
    assert_eq!(summary.email.pending, 0);
}
