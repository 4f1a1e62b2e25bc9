//! Status enums for campaigns, targets, messages and funnel events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Finished,
    Cancelled,
}

impl CampaignStatus {
    /// Returns whether this status has no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Finished | CampaignStatus::Cancelled)
    }

    /// Returns whether the dispatcher may claim messages for a campaign in this status
    pub fn allows_dispatch(&self) -> bool {
        !matches!(self, CampaignStatus::Draft | CampaignStatus::Paused)
    }

    /// Returns the database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Finished => "finished",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "finished" => Ok(CampaignStatus::Finished),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            _ => Err(format!("Unknown campaign status: {}", s)),
        }
    }
}

/// Triggers naming each campaign status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Trigger {
    Launch,
    Pause,
    Resume,
    Finish,
    Cancel,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Launch => write!(f, "Launch"),
            Trigger::Pause => write!(f, "Pause"),
            Trigger::Resume => write!(f, "Resume"),
            Trigger::Finish => write!(f, "Finish"),
            Trigger::Cancel => write!(f, "Cancel"),
        }
    }
}

/// Status of a campaign target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Notified,
    Converted,
    Skipped,
}

impl TargetStatus {
    /// Statuses the message builder creates jobs for
    pub fn is_messageable(&self) -> bool {
        matches!(self, TargetStatus::Pending | TargetStatus::Notified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Notified => "notified",
            TargetStatus::Converted => "converted",
            TargetStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TargetStatus::Pending),
            "notified" => Ok(TargetStatus::Notified),
            "converted" => Ok(TargetStatus::Converted),
            "skipped" => Ok(TargetStatus::Skipped),
            _ => Err(format!("Unknown target status: {}", s)),
        }
    }
}

/// Outbound messaging channel with a per-target job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Whatsapp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Delivery status of a message job
///
/// `Sending` marks a row claimed by a dispatcher run; no other run can
/// claim it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Skipped,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            "skipped" => Ok(MessageStatus::Skipped),
            _ => Err(format!("Unknown message status: {}", s)),
        }
    }
}

/// Kind of on-site funnel event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelKind {
    Impression,
    Click,
    Close,
    Order,
}

impl FunnelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelKind::Impression => "impression",
            FunnelKind::Click => "click",
            FunnelKind::Close => "close",
            FunnelKind::Order => "order",
        }
    }

    /// Target column caching the first occurrence of this kind
    pub fn first_at_column(&self) -> &'static str {
        match self {
            FunnelKind::Impression => "first_impression_at",
            FunnelKind::Click => "first_click_at",
            FunnelKind::Close => "first_close_at",
            FunnelKind::Order => "first_order_at",
        }
    }
}

impl fmt::Display for FunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FunnelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(FunnelKind::Impression),
            "click" => Ok(FunnelKind::Click),
            "close" => Ok(FunnelKind::Close),
            "order" => Ok(FunnelKind::Order),
            _ => Err(format!("Unknown funnel event kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_status_from_str() {
        assert_eq!(CampaignStatus::from_str("draft").unwrap(), CampaignStatus::Draft);
        assert_eq!(
            CampaignStatus::from_str("cancelled").unwrap(),
            CampaignStatus::Cancelled
        );
        assert!(CampaignStatus::from_str("archived").is_err());
    }

    #[test]
    fn test_campaign_status_terminal() {
        assert!(CampaignStatus::Finished.is_terminal());
        assert!(CampaignStatus::Cancelled.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
        assert!(!CampaignStatus::Draft.is_terminal());
    }

    #[test]
    fn test_dispatch_allowed_statuses() {
        assert!(!CampaignStatus::Draft.allows_dispatch());
        assert!(!CampaignStatus::Paused.allows_dispatch());
        assert!(CampaignStatus::Active.allows_dispatch());
        // Terminal campaigns are claimed so their rows can be marked skipped
        assert!(CampaignStatus::Cancelled.allows_dispatch());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&MessageStatus::Sending).unwrap();
        assert_eq!(json, "\"sending\"");

        let channel: Channel = serde_json::from_str("\"whatsapp\"").unwrap();
        assert_eq!(channel, Channel::Whatsapp);
    }

    #[test]
    fn test_funnel_kind_columns() {
        assert_eq!(FunnelKind::Impression.first_at_column(), "first_impression_at");
        assert_eq!(FunnelKind::Order.first_at_column(), "first_order_at");
        assert_eq!(FunnelKind::from_str("click").unwrap(), FunnelKind::Click);
    }
}
