//! Rows owned by the storefront: interest signals, customers, orders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded interest event (page view, fitment lookup, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignal {
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub product_id: Option<String>,
    pub brand_id: Option<String>,
    pub model_id: Option<String>,
    pub year_id: Option<String>,
    #[serde(default = "default_signal_kind")]
    pub kind: String,
    pub occurred_at: Option<DateTime<Utc>>,
}

fn default_signal_kind() -> String {
    "view".to_string()
}

/// Matching signals grouped under one recipient.
///
/// A visitor linked to a customer is grouped under the customer, so
/// `customer_id` and `visitor_id` are never both set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalAggregate {
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub signals_count: i64,
    pub first_signal_at: DateTime<Utc>,
    pub last_signal_at: DateTime<Utc>,
}

/// Customer directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub email_opt_out: bool,
    #[serde(default)]
    pub whatsapp_opt_out: bool,
}

impl Customer {
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Visitor resolved to a registered customer (e.g. after login)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorLink {
    pub visitor_id: String,
    pub customer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Option<String>,
    pub brand_id: Option<String>,
    pub model_id: Option<String>,
    pub year_id: Option<String>,
}

impl OrderItem {
    /// Value of the column a scope filters on
    pub fn key(&self, column: &str) -> Option<&str> {
        match column {
            "product_id" => self.product_id.as_deref(),
            "brand_id" => self.brand_id.as_deref(),
            "model_id" => self.model_id.as_deref(),
            "year_id" => self.year_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_id: Option<String>,
    pub visitor_id: Option<String>,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}
