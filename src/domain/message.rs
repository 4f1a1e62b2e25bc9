//! Message jobs: one per (target, channel)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Channel, MessageStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub target_id: String,
    pub channel: Channel,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub provider_message_id: Option<String>,
}

/// Result of a message build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub created_email: u64,
    pub created_whatsapp: u64,
}

impl BuildResult {
    pub fn add(&mut self, channel: Channel, created: u64) {
        match channel {
            Channel::Email => self.created_email += created,
            Channel::Whatsapp => self.created_whatsapp += created,
        }
    }
}

/// Tally of one dispatch batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Per-channel message counts for a campaign
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: Option<Channel>,
    pub total: i64,
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl ChannelSummary {
    pub fn for_channel(channel: Channel) -> Self {
        Self {
            channel: Some(channel),
            ..Default::default()
        }
    }

    pub fn record(&mut self, status: MessageStatus, count: i64) {
        self.total += count;
        match status {
            MessageStatus::Pending => self.pending += count,
            MessageStatus::Sending => self.sending += count,
            MessageStatus::Sent => self.sent += count,
            MessageStatus::Failed => self.failed += count,
            MessageStatus::Skipped => self.skipped += count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResult {
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_result_json_is_snake_case() {
        let mut result = BuildResult::default();
        result.add(Channel::Email, 3);
        result.add(Channel::Whatsapp, 1);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["created_email"], 3);
        assert_eq!(json["created_whatsapp"], 1);
    }

    #[test]
    fn test_channel_summary_record() {
        let mut summary = ChannelSummary::for_channel(Channel::Email);
        summary.record(MessageStatus::Sent, 5);
        summary.record(MessageStatus::Failed, 2);
        summary.record(MessageStatus::Pending, 1);
        assert_eq!(summary.total, 8);
        assert_eq!(summary.sent, 5);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.pending, 1);
    }
}
