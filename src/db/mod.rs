//! Database module - SQLite with sqlx

mod campaigns;
mod funnel;
mod messages;
mod pool;
mod reports;
mod signals;
mod targets;

pub use campaigns::*;
pub use funnel::*;
pub use messages::*;
pub use pool::*;
pub use reports::*;
pub use signals::*;
pub use targets::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps lexical order equal to time order, so
/// range predicates can compare the text columns directly.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn from_db_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn from_db_time_opt(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
