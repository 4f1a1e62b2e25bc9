//! Event bus for pub/sub communication between the engine and WebSocket clients

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use serde::Serialize;
use chrono::{DateTime, Utc};

use crate::domain::{Campaign, CampaignStatus, Channel, Trigger};

/// Event types that can be published
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Campaign was created
    CampaignCreated {
        campaign_id: String,
        name: String,
        created_targets: u64,
        timestamp: DateTime<Utc>,
    },

    /// Campaign fields were edited
    CampaignUpdated {
        campaign_id: String,
        campaign: Box<Campaign>,
        timestamp: DateTime<Utc>,
    },

    /// Campaign status changed
    StatusChanged {
        campaign_id: String,
        from_status: CampaignStatus,
        to_status: CampaignStatus,
        trigger: Trigger,
        timestamp: DateTime<Utc>,
    },

    /// Campaign was deleted
    CampaignDeleted {
        campaign_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A targeting run finished
    TargetsRefreshed {
        campaign_id: String,
        created_count: u64,
        new_viewers_only: bool,
        timestamp: DateTime<Utc>,
    },

    /// Message jobs were built
    MessagesBuilt {
        campaign_id: String,
        created_email: u64,
        created_whatsapp: u64,
        timestamp: DateTime<Utc>,
    },

    /// A dispatch batch finished
    DispatchCompleted {
        channel: Channel,
        sent: u64,
        failed: u64,
        skipped: u64,
        timestamp: DateTime<Utc>,
    },

    /// An order converted a target
    TargetConverted {
        campaign_id: String,
        target_id: String,
        order_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the campaign ID associated with this event.
    ///
    /// Events without one are store-wide and go to every connection.
    pub fn campaign_id(&self) -> Option<&str> {
        match self {
            Event::CampaignCreated { campaign_id, .. }
            | Event::CampaignUpdated { campaign_id, .. }
            | Event::StatusChanged { campaign_id, .. }
            | Event::CampaignDeleted { campaign_id, .. }
            | Event::TargetsRefreshed { campaign_id, .. }
            | Event::MessagesBuilt { campaign_id, .. }
            | Event::TargetConverted { campaign_id, .. } => Some(campaign_id),
            Event::DispatchCompleted { .. } => None,
        }
    }
}

/// Event bus for pub/sub communication
pub struct EventBus {
    /// Broadcast sender for all events
    sender: broadcast::Sender<Event>,

    /// Campaign-specific subscriptions
    campaign_subscriptions: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            campaign_subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        // Ignore errors if there are no receivers
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Subscribe a connection to specific campaign events
    pub async fn subscribe_to_campaign(&self, connection_id: &str, campaign_id: &str) {
        let mut subs = self.campaign_subscriptions.write().await;
        let connections = subs.entry(campaign_id.to_string()).or_default();
        if !connections.iter().any(|c| c == connection_id) {
            connections.push(connection_id.to_string());
        }
    }

    /// Unsubscribe a connection from campaign events
    pub async fn unsubscribe_from_campaign(&self, connection_id: &str, campaign_id: &str) {
        let mut subs = self.campaign_subscriptions.write().await;
        if let Some(connections) = subs.get_mut(campaign_id) {
            connections.retain(|c| c != connection_id);
            if connections.is_empty() {
                subs.remove(campaign_id);
            }
        }
    }

    /// Remove all subscriptions for a connection
    pub async fn remove_connection(&self, connection_id: &str) {
        let mut subs = self.campaign_subscriptions.write().await;
        for connections in subs.values_mut() {
            connections.retain(|c| c != connection_id);
        }
        subs.retain(|_, connections| !connections.is_empty());
    }

    /// Check if a connection is subscribed to a campaign
    pub async fn is_subscribed_to_campaign(&self, connection_id: &str, campaign_id: &str) -> bool {
        let subs = self.campaign_subscriptions.read().await;
        subs.get(campaign_id)
            .map(|c| c.iter().any(|id| id == connection_id))
            .unwrap_or(false)
    }

    /// Whether an event should be forwarded to a connection
    pub async fn should_deliver(&self, connection_id: &str, event: &Event) -> bool {
        match event.campaign_id() {
            Some(campaign_id) => self.is_subscribed_to_campaign(connection_id, campaign_id).await,
            None => true,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            campaign_subscriptions: Arc::clone(&self.campaign_subscriptions),
        }
    }
}
