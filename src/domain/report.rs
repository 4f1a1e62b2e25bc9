//! Campaign report read model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::message::ChannelSummary;

/// Reporting window selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReportWindow {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[default]
    #[serde(rename = "all")]
    SinceStart,
}

impl std::str::FromStr for ReportWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(ReportWindow::Last7Days),
            "30d" => Ok(ReportWindow::Last30Days),
            "all" | "all-since-start" => Ok(ReportWindow::SinceStart),
            _ => Err(format!("Unknown report window: {}", s)),
        }
    }
}

impl ReportWindow {
    /// Resolve to concrete bounds for a campaign.
    ///
    /// The upper bound is `now`, or `ends_at` when the campaign already ended.
    pub fn bounds(
        &self,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let upper = match ends_at {
            Some(ends_at) if ends_at < now => ends_at,
            _ => now,
        };
        let lower = match self {
            ReportWindow::Last7Days => upper - Duration::days(7),
            ReportWindow::Last30Days => upper - Duration::days(30),
            ReportWindow::SinceStart => starts_at,
        };
        // A campaign scheduled in the future has an empty window
        (lower.min(upper), upper)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatusCounts {
    pub pending: i64,
    pub notified: i64,
    pub converted: i64,
    pub skipped: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReport {
    pub campaign_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_targets: i64,
    pub old_targets: i64,
    pub new_targets: i64,
    pub onsite_seen_count: i64,
    pub clicked_count: i64,
    pub converted_count: i64,
    pub conversion_rate: f64,
    pub targets_by_status: TargetStatusCounts,
    pub email: ChannelSummary,
    pub whatsapp: ChannelSummary,
}
