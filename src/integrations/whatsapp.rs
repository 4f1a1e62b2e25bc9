//! WhatsApp Cloud API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{handle_response, ChannelTransport, DeliveryReceipt, IntegrationError, OutboundMessage};
use crate::config::WhatsAppConfig;
use crate::domain::Channel;

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// WhatsApp client sending text messages from one business number
pub struct WhatsAppClient {
    client: Client,
    api_url: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl WhatsAppClient {
    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            phone_number_id: config.phone_number_id.clone().filter(|p| !p.is_empty()),
        }
    }

    fn build_request(&self, body: &serde_json::Value) -> Result<reqwest::RequestBuilder, IntegrationError> {
        let phone_number_id = self
            .phone_number_id
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(Channel::Whatsapp))?;
        let token = self.access_token.as_ref().ok_or(IntegrationError::AuthRequired)?;

        let url = format!("{}/{}/messages", self.api_url, phone_number_id);
        Ok(self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .json(body))
    }
}

/// Digits-only international number as the Cloud API expects it
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl ChannelTransport for WhatsAppClient {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && self.access_token.is_some() && self.phone_number_id.is_some()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, IntegrationError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": normalize_phone(&message.to),
            "type": "text",
            "text": { "preview_url": true, "body": message.body },
        });

        let response = self.build_request(&body)?.send().await?;
        let parsed: SendMessageResponse = handle_response(response).await?;

        Ok(DeliveryReceipt {
            provider_message_id: parsed.messages.into_iter().next().map(|m| m.id),
        })
    }
}
