//! Campaign domain model and boundary validation

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{CampaignStatus, Channel};

const MAX_NAME_LEN: usize = 200;
const MAX_LOOKBACK_DAYS: i64 = 365;

/// What a campaign is about: a product, or a vehicle brand/model/year path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignScope {
    #[serde(rename_all = "camelCase")]
    Product { product_id: String },
    #[serde(rename_all = "camelCase")]
    Brand { brand_id: String },
    #[serde(rename_all = "camelCase")]
    Model { brand_id: String, model_id: String },
    #[serde(rename_all = "camelCase")]
    Year {
        brand_id: String,
        model_id: String,
        year_id: String,
    },
}

impl CampaignScope {
    pub fn kind(&self) -> &'static str {
        match self {
            CampaignScope::Product { .. } => "product",
            CampaignScope::Brand { .. } => "brand",
            CampaignScope::Model { .. } => "model",
            CampaignScope::Year { .. } => "year",
        }
    }

    /// Column and key that signals and order items are matched on.
    ///
    /// Vehicle scopes match on their narrowest key.
    pub fn filter_key(&self) -> (&'static str, &str) {
        match self {
            CampaignScope::Product { product_id } => ("product_id", product_id),
            CampaignScope::Brand { brand_id } => ("brand_id", brand_id),
            CampaignScope::Model { model_id, .. } => ("model_id", model_id),
            CampaignScope::Year { year_id, .. } => ("year_id", year_id),
        }
    }

    /// Rebuild a scope from its stored columns
    pub fn from_columns(
        kind: &str,
        product_id: Option<String>,
        brand_id: Option<String>,
        model_id: Option<String>,
        year_id: Option<String>,
    ) -> Option<Self> {
        match kind {
            "product" => Some(CampaignScope::Product {
                product_id: product_id?,
            }),
            "brand" => Some(CampaignScope::Brand { brand_id: brand_id? }),
            "model" => Some(CampaignScope::Model {
                brand_id: brand_id?,
                model_id: model_id?,
            }),
            "year" => Some(CampaignScope::Year {
                brand_id: brand_id?,
                model_id: model_id?,
                year_id: year_id?,
            }),
            _ => None,
        }
    }

    pub fn product_id(&self) -> Option<&str> {
        match self {
            CampaignScope::Product { product_id } => Some(product_id),
            _ => None,
        }
    }

    pub fn brand_id(&self) -> Option<&str> {
        match self {
            CampaignScope::Brand { brand_id }
            | CampaignScope::Model { brand_id, .. }
            | CampaignScope::Year { brand_id, .. } => Some(brand_id),
            CampaignScope::Product { .. } => None,
        }
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            CampaignScope::Model { model_id, .. } | CampaignScope::Year { model_id, .. } => {
                Some(model_id)
            }
            _ => None,
        }
    }

    pub fn year_id(&self) -> Option<&str> {
        match self {
            CampaignScope::Year { year_id, .. } => Some(year_id),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let keys: Vec<(&'static str, &str)> = match self {
            CampaignScope::Product { product_id } => vec![("productId", product_id.as_str())],
            CampaignScope::Brand { brand_id } => vec![("brandId", brand_id.as_str())],
            CampaignScope::Model { brand_id, model_id } => {
                vec![("brandId", brand_id.as_str()), ("modelId", model_id.as_str())]
            }
            CampaignScope::Year {
                brand_id,
                model_id,
                year_id,
            } => vec![
                ("brandId", brand_id.as_str()),
                ("modelId", model_id.as_str()),
                ("yearId", year_id.as_str()),
            ],
        };

        for (name, value) in keys {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingScopeKey {
                    scope: self.kind(),
                    key: name,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    #[default]
    Message,
    Discount,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Message => "message",
            CampaignType::Discount => "discount",
        }
    }
}

impl std::str::FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(CampaignType::Message),
            "discount" => Ok(CampaignType::Discount),
            _ => Err(format!("Unknown campaign type: {}", s)),
        }
    }
}

/// Public campaigns reach every visitor on-site; targeted campaigns reach an
/// explicit list of targets through any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceMode {
    Public,
    Targeted,
}

impl AudienceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceMode::Public => "public",
            AudienceMode::Targeted => "targeted",
        }
    }
}

impl std::str::FromStr for AudienceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AudienceMode::Public),
            "targeted" => Ok(AudienceMode::Targeted),
            _ => Err(format!("Unknown audience mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelFlags {
    pub send_onsite: bool,
    pub send_email: bool,
    pub send_whatsapp: bool,
}

impl ChannelFlags {
    /// Channels that get one message job per target
    pub fn message_channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if self.send_email {
            channels.push(Channel::Email);
        }
        if self.send_whatsapp {
            channels.push(Channel::Whatsapp);
        }
        channels
    }

    pub fn any(&self) -> bool {
        self.send_onsite || self.send_email || self.send_whatsapp
    }

    fn addresses_identity(&self) -> bool {
        self.send_email || self.send_whatsapp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetingConfig {
    pub only_customers: bool,
    pub lookback_days: i64,
    pub min_signals: i64,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            only_customers: true,
            lookback_days: 30,
            min_signals: 1,
        }
    }
}

/// A promotional effort over a product or vehicle scope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub scope: CampaignScope,
    pub campaign_type: CampaignType,
    pub audience_mode: AudienceMode,
    pub channels: ChannelFlags,
    pub targeting: TargetingConfig,
    pub onsite_paths: Option<Vec<String>>,
    pub status: CampaignStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub discount_price: Option<f64>,
    pub coupon_code: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub whatsapp_body: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn is_public(&self) -> bool {
        self.audience_mode == AudienceMode::Public
    }

    /// Upper bound of the campaign window as seen at `now`
    pub fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.ends_at {
            Some(ends_at) if ends_at < now => ends_at,
            _ => now,
        }
    }

    /// Whether `at` falls inside `[starts_at, ends_at or now]`
    pub fn in_window(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at >= self.starts_at && at <= self.window_end(now)
    }

    /// Whether an on-site request for `path` should show this campaign
    pub fn matches_path(&self, path: &str) -> bool {
        match &self.onsite_paths {
            None => true,
            Some(paths) if paths.is_empty() => true,
            Some(paths) => paths.iter().any(|p| match p.strip_suffix("/*") {
                Some(prefix) => path == prefix || path.starts_with(&format!("{}/", prefix)),
                None => p == path,
            }),
        }
    }

    /// Editable spec view of the stored campaign, used to re-validate edits
    pub fn to_spec(&self) -> CampaignSpec {
        CampaignSpec {
            name: self.name.clone(),
            scope: self.scope.clone(),
            campaign_type: self.campaign_type,
            audience_mode: self.audience_mode,
            channels: self.channels,
            targeting: self.targeting,
            onsite_paths: self.onsite_paths.clone(),
            starts_at: Some(self.starts_at),
            ends_at: self.ends_at,
            discount_price: self.discount_price,
            coupon_code: self.coupon_code.clone(),
            email_subject: self.email_subject.clone(),
            email_body: self.email_body.clone(),
            whatsapp_body: self.whatsapp_body.clone(),
            status: None,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSpec {
    pub name: String,
    pub scope: CampaignScope,
    #[serde(default)]
    pub campaign_type: CampaignType,
    pub audience_mode: AudienceMode,
    #[serde(default)]
    pub channels: ChannelFlags,
    #[serde(default)]
    pub targeting: TargetingConfig,
    #[serde(default)]
    pub onsite_paths: Option<Vec<String>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub discount_price: Option<f64>,
    pub coupon_code: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub whatsapp_body: Option<String>,
    /// Initial status; only `draft` and `active` are accepted
    pub status: Option<CampaignStatus>,
}

/// Request body for editing a campaign.
///
/// Scope and audience mode are fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub campaign_type: Option<CampaignType>,
    pub channels: Option<ChannelFlags>,
    pub targeting: Option<TargetingConfig>,
    pub onsite_paths: Option<Vec<String>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub discount_price: Option<f64>,
    pub coupon_code: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub whatsapp_body: Option<String>,
    pub status: Option<CampaignStatus>,
    /// Remove the end date; ignored when `ends_at` is also given
    #[serde(default)]
    pub clear_ends_at: bool,
    /// Show on every path again; ignored when `onsite_paths` is also given
    #[serde(default)]
    pub clear_onsite_paths: bool,
}

impl UpdateCampaignRequest {
    /// Whether the request edits anything besides `status`
    pub fn has_field_changes(&self) -> bool {
        self.name.is_some()
            || self.campaign_type.is_some()
            || self.channels.is_some()
            || self.targeting.is_some()
            || self.onsite_paths.is_some()
            || self.starts_at.is_some()
            || self.ends_at.is_some()
            || self.discount_price.is_some()
            || self.coupon_code.is_some()
            || self.email_subject.is_some()
            || self.email_body.is_some()
            || self.whatsapp_body.is_some()
            || self.clear_ends_at
            || self.clear_onsite_paths
    }

    /// Apply the edits onto a stored campaign's spec
    pub fn apply_to(&self, mut spec: CampaignSpec) -> CampaignSpec {
        if let Some(name) = &self.name {
            spec.name = name.clone();
        }
        if let Some(campaign_type) = self.campaign_type {
            spec.campaign_type = campaign_type;
        }
        if let Some(channels) = self.channels {
            spec.channels = channels;
        }
        if let Some(targeting) = self.targeting {
            spec.targeting = targeting;
        }
        if let Some(paths) = &self.onsite_paths {
            spec.onsite_paths = Some(paths.clone());
        } else if self.clear_onsite_paths {
            spec.onsite_paths = None;
        }
        if let Some(starts_at) = self.starts_at {
            spec.starts_at = Some(starts_at);
        }
        if let Some(ends_at) = self.ends_at {
            spec.ends_at = Some(ends_at);
        } else if self.clear_ends_at {
            spec.ends_at = None;
        }
        if let Some(price) = self.discount_price {
            spec.discount_price = Some(price);
        }
        if let Some(code) = &self.coupon_code {
            spec.coupon_code = Some(code.clone());
        }
        if let Some(subject) = &self.email_subject {
            spec.email_subject = Some(subject.clone());
        }
        if let Some(body) = &self.email_body {
            spec.email_body = Some(body.clone());
        }
        if let Some(body) = &self.whatsapp_body {
            spec.whatsapp_body = Some(body.clone());
        }
        spec
    }
}

/// Rejections produced by [`validate`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Campaign name must be 1-200 characters")]
    InvalidName,

    #[error("{scope} scope requires {key}")]
    MissingScopeKey { scope: &'static str, key: &'static str },

    #[error("Targeted campaigns must enable at least one channel")]
    NoChannels,

    #[error("Email and WhatsApp campaigns must target customers only")]
    AnonymousIdentityChannel,

    #[error("lookbackDays must be between 1 and 365, got {0}")]
    LookbackOutOfRange(i64),

    #[error("minSignals must be at least 1, got {0}")]
    MinSignalsOutOfRange(i64),

    #[error("endsAt must be after startsAt")]
    InvalidWindow,

    #[error("Discount campaigns require a discount price or a coupon code")]
    MissingDiscount,

    #[error("Discount price must be positive, got {0}")]
    InvalidDiscountPrice(f64),

    #[error("On-site path must start with '/': {0}")]
    InvalidOnsitePath(String),

    #[error("Campaigns can only be created as draft or active, not {0}")]
    InvalidInitialStatus(CampaignStatus),

    #[error("Order events require an orderId")]
    MissingOrderId,

    #[error("A customerId or visitorId is required")]
    MissingIdentity,

    #[error("{0}")]
    Invalid(String),
}

/// A campaign spec that passed [`validate`]; only obtainable through it
#[derive(Debug, Clone)]
pub struct NormalizedSpec(CampaignSpec);

impl NormalizedSpec {
    pub fn spec(&self) -> &CampaignSpec {
        &self.0
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        // validate() always fills starts_at
        self.0.starts_at.unwrap_or_else(Utc::now)
    }

    pub fn initial_status(&self) -> CampaignStatus {
        self.0.status.unwrap_or(CampaignStatus::Draft)
    }
}

/// Validate and normalize a campaign spec at the boundary.
///
/// Public campaigns get their channel flags forced to on-site only,
/// whatever the client sent.
pub fn validate(mut spec: CampaignSpec, now: DateTime<Utc>) -> Result<NormalizedSpec, ValidationError> {
    spec.name = spec.name.trim().to_string();
    if spec.name.is_empty() || spec.name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidName);
    }

    spec.scope.validate()?;

    match spec.audience_mode {
        AudienceMode::Public => {
            spec.channels = ChannelFlags {
                send_onsite: true,
                send_email: false,
                send_whatsapp: false,
            };
        }
        AudienceMode::Targeted => {
            if !spec.channels.any() {
                return Err(ValidationError::NoChannels);
            }
        }
    }

    if spec.channels.addresses_identity() && !spec.targeting.only_customers {
        return Err(ValidationError::AnonymousIdentityChannel);
    }

    let lookback = spec.targeting.lookback_days;
    if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback) {
        return Err(ValidationError::LookbackOutOfRange(lookback));
    }
    if spec.targeting.min_signals < 1 {
        return Err(ValidationError::MinSignalsOutOfRange(spec.targeting.min_signals));
    }

    let starts_at = spec.starts_at.unwrap_or(now);
    spec.starts_at = Some(starts_at);
    if let Some(ends_at) = spec.ends_at {
        if ends_at <= starts_at {
            return Err(ValidationError::InvalidWindow);
        }
    }

    spec.coupon_code = spec
        .coupon_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(price) = spec.discount_price {
        if !(price > 0.0) {
            return Err(ValidationError::InvalidDiscountPrice(price));
        }
    }
    if spec.campaign_type == CampaignType::Discount
        && spec.discount_price.is_none()
        && spec.coupon_code.is_none()
    {
        return Err(ValidationError::MissingDiscount);
    }

    spec.onsite_paths = normalize_paths(spec.onsite_paths.take())?;

    match spec.status {
        None | Some(CampaignStatus::Draft) | Some(CampaignStatus::Active) => {}
        Some(other) => return Err(ValidationError::InvalidInitialStatus(other)),
    }

    Ok(NormalizedSpec(spec))
}

fn normalize_paths(paths: Option<Vec<String>>) -> Result<Option<Vec<String>>, ValidationError> {
    let Some(paths) = paths else {
        return Ok(None);
    };

    let mut set = BTreeSet::new();
    for path in paths {
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidOnsitePath(path.to_string()));
        }
        set.insert(path.to_string());
    }

    if set.is_empty() {
        Ok(None)
    } else {
        Ok(Some(set.into_iter().collect()))
    }
}
