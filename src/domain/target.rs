//! Target domain model: one recipient admitted into a campaign's audience

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::TargetStatus;

/// Recipient identity of a target. Exactly one is ever set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Customer(String),
    Visitor(String),
}

impl Recipient {
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Recipient::Customer(id) => Some(id),
            Recipient::Visitor(_) => None,
        }
    }

    pub fn visitor_id(&self) -> Option<&str> {
        match self {
            Recipient::Visitor(id) => Some(id),
            Recipient::Customer(_) => None,
        }
    }

    pub fn is_customer(&self) -> bool {
        matches!(self, Recipient::Customer(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub campaign_id: String,
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub signals_count: i64,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub status: TargetStatus,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub first_impression_at: Option<DateTime<Utc>>,
    pub first_click_at: Option<DateTime<Utc>>,
    pub first_close_at: Option<DateTime<Utc>>,
    pub first_order_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub conversion_order_id: Option<String>,
}

impl Target {
    pub fn recipient(&self) -> Option<Recipient> {
        match (&self.customer_id, &self.visitor_id) {
            (Some(customer_id), _) => Some(Recipient::Customer(customer_id.clone())),
            (None, Some(visitor_id)) => Some(Recipient::Visitor(visitor_id.clone())),
            (None, None) => None,
        }
    }

    /// Joined after launch. Derived on every read so editing `starts_at`
    /// reclassifies existing targets.
    pub fn is_new(&self, starts_at: DateTime<Utc>) -> bool {
        self.created_at > starts_at
    }
}

/// Target row as listed in the admin UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    #[serde(flatten)]
    pub target: Target,
    pub is_new: bool,
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Query parameters for target listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetListParams {
    pub status: Option<TargetStatus>,
    pub q: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// One page of targets; `next_cursor` is absent on the last page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPage {
    pub items: Vec<TargetView>,
    pub next_cursor: Option<String>,
}

/// A recipient admitted by a targeting run, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTarget {
    pub recipient: Recipient,
    pub signals_count: i64,
    pub last_signal_at: DateTime<Utc>,
}

/// Result of a targeting run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub created_count: u64,
}
