//! Transactional email HTTP API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{handle_response, ChannelTransport, DeliveryReceipt, IntegrationError, OutboundMessage};
use crate::config::EmailConfig;
use crate::domain::Channel;

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    #[serde(alias = "messageId", alias = "message_id")]
    id: Option<String>,
}

/// Email client posting JSON to a transactional mail endpoint
pub struct EmailClient {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from_address: String,
    from_name: String,
}

impl EmailClient {
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone().filter(|u| !u.is_empty()),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        }
    }

    fn build_request(&self, body: &serde_json::Value) -> Result<reqwest::RequestBuilder, IntegrationError> {
        let url = self
            .api_url
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(Channel::Email))?;
        let key = self.api_key.as_ref().ok_or(IntegrationError::AuthRequired)?;

        Ok(self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", key))
            .header("User-Agent", "outreach/0.1.0")
            .json(body))
    }
}

#[async_trait]
impl ChannelTransport for EmailClient {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, IntegrationError> {
        let body = serde_json::json!({
            "from": { "email": self.from_address, "name": self.from_name },
            "to": [{ "email": message.to, "name": message.recipient_name }],
            "subject": message.subject.clone().unwrap_or_default(),
            "html": message.body,
            "headers": { "X-Outreach-Message-Id": message.message_id },
        });

        let response = self.build_request(&body)?.send().await?;
        let parsed: SendEmailResponse = handle_response(response).await?;

        Ok(DeliveryReceipt {
            provider_message_id: parsed.id,
        })
    }
}
