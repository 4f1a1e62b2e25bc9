//! Message dispatcher
//!
//! Sends queued jobs of one channel across all campaigns. Each run claims
//! its batch with a single conditional update (`pending -> sending`), so
//! overlapping runs, in this process or another, never send a row twice.
//! Within a process runs of the same channel are additionally serialized.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::render::MessageRenderer;
use crate::config::{Config, DispatchConfig};
use crate::db::{self, DeliveryRow};
use crate::domain::{Campaign, Channel, DispatchResult, EngineResult, TargetStatus};
use crate::integrations::{ChannelTransport, OutboundMessage, Transports};

/// Per-channel run locks
#[derive(Clone, Default)]
pub struct DispatchLocks {
    email: Arc<Mutex<()>>,
    whatsapp: Arc<Mutex<()>>,
}

impl DispatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_channel(&self, channel: Channel) -> &Mutex<()> {
        match channel {
            Channel::Email => &self.email,
            Channel::Whatsapp => &self.whatsapp,
        }
    }
}

/// What to do with one claimed job
#[derive(Debug)]
enum Decision {
    Skip {
        reason: String,
        skip_target: bool,
    },
    Send(OutboundMessage),
}

/// Dispatcher for queued message jobs
#[derive(Clone)]
pub struct Dispatcher {
    pool: SqlitePool,
    transports: Transports,
    renderer: MessageRenderer,
    config: DispatchConfig,
    locks: DispatchLocks,
}

impl Dispatcher {
    pub fn new(
        pool: SqlitePool,
        transports: Transports,
        renderer: MessageRenderer,
        config: DispatchConfig,
    ) -> Self {
        Self {
            pool,
            transports,
            renderer,
            config,
            locks: DispatchLocks::new(),
        }
    }

    pub fn from_config(pool: SqlitePool, transports: Transports, config: &Config) -> Self {
        Self::new(
            pool,
            transports,
            MessageRenderer::new(&config.email, &config.storefront),
            config.dispatch.clone(),
        )
    }

    pub fn transports(&self) -> &Transports {
        &self.transports
    }

    /// Run one batch for `channel`.
    ///
    /// Individual send failures never fail the call; they are counted and
    /// stored on the job.
    pub async fn dispatch(&self, channel: Channel) -> EngineResult<DispatchResult> {
        let _guard = self.locks.for_channel(channel).lock().await;
        let now = Utc::now();

        let cutoff = now - Duration::seconds(self.config.stale_claim_secs);
        let expired = db::fail_stale_claims(&self.pool, channel, cutoff).await?;
        if expired > 0 {
            tracing::warn!(channel = %channel, expired, "Failed stale message claims");
        }

        let Some(transport) = self.transports.configured(channel) else {
            let pending = db::count_pending(&self.pool, channel).await?;
            tracing::warn!(
                channel = %channel,
                pending,
                "Channel transport not configured; nothing sent"
            );
            return Ok(DispatchResult {
                sent: 0,
                failed: 0,
                skipped: pending.max(0) as u64,
            });
        };

        let claimed = db::claim_pending(&self.pool, channel, self.config.batch_limit, now).await?;
        if claimed.is_empty() {
            tracing::debug!(channel = %channel, "No pending messages");
            return Ok(DispatchResult::default());
        }

        let deliveries = db::load_deliveries(&self.pool, &claimed).await?;
        let mut campaigns: HashMap<String, Option<Campaign>> = HashMap::new();
        let mut result = DispatchResult::default();
        let mut outbound = Vec::new();

        for delivery in &deliveries {
            if !campaigns.contains_key(&delivery.campaign_id) {
                let campaign = db::get_campaign(&self.pool, &delivery.campaign_id).await?;
                campaigns.insert(delivery.campaign_id.clone(), campaign);
            }
            let campaign = campaigns.get(&delivery.campaign_id).and_then(Option::as_ref);

            match self.decide(channel, campaign, delivery) {
                Decision::Send(message) => outbound.push((delivery.target_id.clone(), message)),
                Decision::Skip { reason, skip_target } => {
                    db::mark_message_skipped(&self.pool, &delivery.message_id, &reason).await?;
                    if skip_target {
                        db::mark_target_skipped(&self.pool, &delivery.target_id).await?;
                    }
                    tracing::debug!(
                        channel = %channel,
                        message_id = %delivery.message_id,
                        reason = %reason,
                        "Message skipped"
                    );
                    result.skipped += 1;
                }
            }
        }

        let timeout = self.config.send_timeout();
        let timeout_secs = self.config.send_timeout_secs;
        let outcomes: Vec<_> = stream::iter(outbound)
            .map(|(target_id, message)| {
                let transport: Arc<dyn ChannelTransport> = transport.clone();
                async move {
                    let outcome = tokio::time::timeout(timeout, transport.send(&message)).await;
                    (target_id, message, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (target_id, message, outcome) in outcomes {
            match outcome {
                Ok(Ok(receipt)) => {
                    let sent_at = Utc::now();
                    db::mark_message_sent(
                        &self.pool,
                        &message.message_id,
                        sent_at,
                        receipt.provider_message_id.as_deref(),
                    )
                    .await?;
                    db::mark_target_notified(&self.pool, &target_id, sent_at).await?;
                    result.sent += 1;
                }
                Ok(Err(e)) => {
                    let error = e.to_string();
                    tracing::warn!(
                        channel = %channel,
                        message_id = %message.message_id,
                        error = %error,
                        "Message send failed"
                    );
                    db::mark_message_failed(&self.pool, &message.message_id, &error).await?;
                    result.failed += 1;
                }
                Err(_) => {
                    let error = format!("timed out after {}s", timeout_secs);
                    tracing::warn!(
                        channel = %channel,
                        message_id = %message.message_id,
                        "Message send timed out"
                    );
                    db::mark_message_failed(&self.pool, &message.message_id, &error).await?;
                    result.failed += 1;
                }
            }
        }

        tracing::info!(
            channel = %channel,
            claimed = claimed.len(),
            sent = result.sent,
            failed = result.failed,
            skipped = result.skipped,
            "Dispatch complete"
        );

        Ok(result)
    }

    fn decide(&self, channel: Channel, campaign: Option<&Campaign>, delivery: &DeliveryRow) -> Decision {
        let Some(campaign) = campaign else {
            return skip("campaign not found", false);
        };
        if campaign.status.is_terminal() {
            return skip(format!("campaign {}", campaign.status), false);
        }

        let target_status = delivery.target_status();
        if matches!(target_status, TargetStatus::Converted | TargetStatus::Skipped) {
            return skip(format!("target {}", target_status), false);
        }

        let (opted_out, address) = match channel {
            Channel::Email => (delivery.email_opt_out, delivery.email.as_deref()),
            Channel::Whatsapp => (delivery.whatsapp_opt_out, delivery.phone.as_deref()),
        };
        if opted_out.unwrap_or(false) {
            return skip(format!("recipient opted out of {}", channel), true);
        }
        let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) else {
            return skip(format!("no {} address", channel), false);
        };

        let rendered = self
            .renderer
            .render(campaign, channel, delivery.customer_name.as_deref());

        Decision::Send(OutboundMessage {
            message_id: delivery.message_id.clone(),
            channel,
            to: address.to_string(),
            recipient_name: delivery.customer_name.clone(),
            subject: rendered.subject,
            body: rendered.body,
        })
    }
}

fn skip(reason: impl Into<String>, skip_target: bool) -> Decision {
    Decision::Skip {
        reason: reason.into(),
        skip_target,
    }
}
