//! On-site funnel events attributed to targets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::FunnelKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelEvent {
    pub id: String,
    pub target_id: String,
    pub kind: FunnelKind,
    pub occurred_at: DateTime<Utc>,
    pub order_id: Option<String>,
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event posted by the storefront.
///
/// Addressed either by `target_id` or by `campaign_id` plus the caller's
/// customer or visitor id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub target_id: Option<String>,
    pub campaign_id: Option<String>,
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub kind: FunnelKind,
    pub occurred_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelOutcome {
    /// This event set the target's first-occurrence timestamp for its kind
    pub first_occurrence: bool,
    /// This event converted the target
    pub converted: bool,
}
