//! Channel transports for outbound messages
//!
//! Each external messaging provider implements [`ChannelTransport`]; the
//! dispatcher looks transports up by channel in a [`Transports`] registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::domain::Channel;

pub mod email;
pub mod whatsapp;

pub use email::EmailClient;
pub use whatsapp::WhatsAppClient;

/// Common integration error type
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication required")]
    AuthRequired,

    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{0} transport is not configured")]
    NotConfigured(Channel),
}

/// A rendered message ready for a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub message_id: String,
    pub channel: Channel,
    /// Email address or phone number
    pub to: String,
    pub recipient_name: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

/// What a provider returned for an accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
}

/// An external channel able to deliver messages
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Channel this transport delivers on
    fn channel(&self) -> Channel;

    /// Whether credentials and endpoint are present store-wide
    fn is_configured(&self) -> bool;

    /// Deliver one message. Errors are stored verbatim on the message row.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, IntegrationError>;
}

/// Registry of channel transports
#[derive(Clone, Default)]
pub struct Transports {
    transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
}

impl Transports {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the HTTP transports from configuration
    pub fn from_config(config: &Config) -> Self {
        let mut transports = Self::new();
        transports.register(Arc::new(EmailClient::from_config(&config.email)));
        transports.register(Arc::new(WhatsAppClient::from_config(&config.whatsapp)));
        transports
    }

    /// Register a transport, replacing any previous one for its channel
    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        self.transports.insert(transport.channel(), transport);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.register(transport);
        self
    }

    /// Get the transport for a channel
    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelTransport>> {
        self.transports.get(&channel).cloned()
    }

    /// Get the transport for a channel if it is ready to send
    pub fn configured(&self, channel: Channel) -> Option<Arc<dyn ChannelTransport>> {
        self.get(channel).filter(|t| t.is_configured())
    }

    /// Get a summary of configured channels
    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            email: self.configured(Channel::Email).is_some(),
            whatsapp: self.configured(Channel::Whatsapp).is_some(),
        }
    }
}

/// Status of available transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub email: bool,
    pub whatsapp: bool,
}

/// Map a provider response to its JSON body or an [`IntegrationError`]
pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, IntegrationError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(IntegrationError::AuthRequired);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse().ok());
        return Err(IntegrationError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(IntegrationError::ApiError {
            status: status.as_u16(),
            message: error_text,
        });
    }

    response
        .json()
        .await
        .map_err(|e| IntegrationError::ParseError(e.to_string()))
}
