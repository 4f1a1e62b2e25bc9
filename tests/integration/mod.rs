//! End-to-end scenarios driven through the library API
//!
//! Each test gets a fresh database: in-memory for single-connection flows,
//! a temporary file when concurrent writers are exercised.

mod concurrency;
mod funnel;
mod messaging;
mod targeting;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use outreach::db::{init_database, init_memory_database};
use outreach::domain::{
    AudienceMode, CampaignScope, CampaignSpec, CampaignStatus, ChannelFlags, Customer, NewSignal,
    TargetingConfig,
};
use outreach::ingest;
use outreach::state_machine::{create_campaign, CreatedCampaign};

pub const PRODUCT: &str = "disc-1";

pub async fn memory_pool() -> SqlitePool {
    init_memory_database().await.expect("in-memory database")
}

/// File-backed pool; keep the returned dir alive for the test's duration
pub async fn file_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("outreach.db");
    let pool = init_database(&path.to_string_lossy()).await.expect("file database");
    (dir, pool)
}

pub async fn add_customer(pool: &SqlitePool, id: &str, email: Option<&str>, phone: Option<&str>) {
    ingest::upsert_customer(
        pool,
        Customer {
            id: id.to_string(),
            name: id.to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            email_opt_out: false,
            whatsapp_opt_out: false,
        },
    )
    .await
    .expect("customer upsert");
}

pub async fn add_signal(
    pool: &SqlitePool,
    customer_id: Option<&str>,
    visitor_id: Option<&str>,
    product_id: &str,
    occurred_at: DateTime<Utc>,
) {
    ingest::record_signal(
        pool,
        NewSignal {
            customer_id: customer_id.map(String::from),
            visitor_id: visitor_id.map(String::from),
            product_id: Some(product_id.to_string()),
            brand_id: None,
            model_id: None,
            year_id: None,
            kind: "view".to_string(),
            occurred_at: Some(occurred_at),
        },
    )
    .await
    .expect("signal");
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

pub fn targeted_spec(channels: ChannelFlags, lookback_days: i64, min_signals: i64) -> CampaignSpec {
    CampaignSpec {
        name: "Brake discs".to_string(),
        scope: CampaignScope::Product {
            product_id: PRODUCT.to_string(),
        },
        campaign_type: Default::default(),
        audience_mode: AudienceMode::Targeted,
        channels,
        targeting: TargetingConfig {
            only_customers: true,
            lookback_days,
            min_signals,
        },
        onsite_paths: None,
        starts_at: None,
        ends_at: None,
        discount_price: None,
        coupon_code: None,
        email_subject: None,
        email_body: None,
        whatsapp_body: None,
        status: Some(CampaignStatus::Active),
    }
}

pub fn email_only() -> ChannelFlags {
    ChannelFlags {
        send_onsite: false,
        send_email: true,
        send_whatsapp: false,
    }
}

pub fn email_and_whatsapp() -> ChannelFlags {
    ChannelFlags {
        send_onsite: true,
        send_email: true,
        send_whatsapp: true,
    }
}

pub async fn create_active(pool: &SqlitePool, spec: CampaignSpec) -> CreatedCampaign {
    create_campaign(pool, spec).await.expect("campaign created")
}
