//! Message rendering
//!
//! Email subject and body are `{{placeholder}}` templates, taken from the
//! campaign or from the configured defaults. WhatsApp uses a fixed layout
//! with an optional campaign-supplied middle line.
//!
//! Placeholders: `name`, `campaign`, `offer`, `price`, `coupon`, `link`.
//! Unknown placeholders are left in place.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::{EmailConfig, StorefrontConfig};
use crate::domain::{Campaign, CampaignScope, Channel};

const FALLBACK_NAME: &str = "there";

/// Rendered payload for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// Values substituted into templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<&'static str, String>,
}

impl TemplateContext {
    pub fn new(campaign: &Campaign, recipient_name: Option<&str>, base_url: &str) -> Self {
        let name = recipient_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_NAME);

        let price = campaign
            .discount_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_default();
        let coupon = campaign.coupon_code.clone().unwrap_or_default();

        let mut values = HashMap::new();
        values.insert("name", name.to_string());
        values.insert("campaign", campaign.name.clone());
        values.insert("offer", offer_text(&price, &coupon));
        values.insert("price", price);
        values.insert("coupon", coupon);
        values.insert("link", campaign_link(campaign, base_url));
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Copy with every value escaped for an HTML body
    fn html_escaped(&self) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(k, v)| (*k, escape_html(v)))
                .collect(),
        }
    }
}

fn offer_text(price: &str, coupon: &str) -> String {
    match (price.is_empty(), coupon.is_empty()) {
        (false, false) => format!("Now only {}. Use code {} at checkout.", price, coupon),
        (false, true) => format!("Now only {}.", price),
        (true, false) => format!("Use code {} at checkout.", coupon),
        (true, true) => String::new(),
    }
}

/// Storefront page for the campaign's scope, tagged with the campaign id
pub fn campaign_link(campaign: &Campaign, base_url: &str) -> String {
    let path = match &campaign.scope {
        CampaignScope::Product { product_id } => format!("/products/{}", product_id),
        CampaignScope::Brand { brand_id } => format!("/vehicles/{}", brand_id),
        CampaignScope::Model { brand_id, model_id } => {
            format!("/vehicles/{}/{}", brand_id, model_id)
        }
        CampaignScope::Year {
            brand_id,
            model_id,
            year_id,
        } => format!("/vehicles/{}/{}/{}", brand_id, model_id, year_id),
    };
    format!("{}{}?campaign={}", base_url.trim_end_matches('/'), path, campaign.id)
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").ok()).as_ref()
}

/// Substitute `{{key}}` placeholders from `ctx`
pub fn render_template(template: &str, ctx: &TemplateContext) -> String {
    let Some(re) = placeholder_re() else {
        return template.to_string();
    };

    re.replace_all(template, |caps: &Captures| match ctx.get(&caps[1]) {
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    })
    .into_owned()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders campaign messages for each channel
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    default_subject: String,
    default_body: String,
    base_url: String,
}

impl MessageRenderer {
    pub fn new(email: &EmailConfig, storefront: &StorefrontConfig) -> Self {
        Self {
            default_subject: email.default_subject.clone(),
            default_body: email.default_body.clone(),
            base_url: storefront.base_url.clone(),
        }
    }

    pub fn render(
        &self,
        campaign: &Campaign,
        channel: Channel,
        recipient_name: Option<&str>,
    ) -> RenderedMessage {
        let ctx = TemplateContext::new(campaign, recipient_name, &self.base_url);
        match channel {
            Channel::Email => self.render_email(campaign, &ctx),
            Channel::Whatsapp => render_whatsapp(campaign, &ctx),
        }
    }

    fn render_email(&self, campaign: &Campaign, ctx: &TemplateContext) -> RenderedMessage {
        let subject_template = non_empty(&campaign.email_subject).unwrap_or(&self.default_subject);
        let body_template = non_empty(&campaign.email_body).unwrap_or(&self.default_body);

        RenderedMessage {
            subject: Some(render_template(subject_template, ctx)),
            body: render_template(body_template, &ctx.html_escaped()),
        }
    }
}

fn render_whatsapp(campaign: &Campaign, ctx: &TemplateContext) -> RenderedMessage {
    let name = ctx.get("name").unwrap_or(FALLBACK_NAME);
    let middle = match non_empty(&campaign.whatsapp_body) {
        Some(template) => render_template(template, ctx),
        None => ctx.get("offer").unwrap_or_default().to_string(),
    };

    let mut lines = vec![format!("Hi {}! {}", name, campaign.name)];
    if !middle.trim().is_empty() {
        lines.push(middle.trim().to_string());
    }
    lines.push(ctx.get("link").unwrap_or_default().to_string());

    RenderedMessage {
        subject: None,
        body: lines.join("\n\n"),
    }
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.trim().is_empty())
}
