//! WhatsApp Cloud API: the inbound message shape and the reply sender.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::ChannelError;

/// A text message received on a business's WhatsApp number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundWhatsAppMessage {
    /// WhatsApp message ID (`wamid.*`).
    pub message_id: String,
    /// Customer's number.
    pub from: String,
    /// Business's display number.
    pub to: String,
    pub phone_number_id: String,
    pub business_account_id: String,
    pub text: String,
}

/// Sends a text reply to a WhatsApp user.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// `to` is the recipient's number with country code and no `+`.
    /// `phone_number_id` is the business number's Graph API id.
    async fn send_text(
        &self,
        to: &str,
        message: &str,
        phone_number_id: &str,
        access_token: &str,
    ) -> Result<(), ChannelError>;
}

/// Graph API client for `POST /{phone_number_id}/messages`.
pub struct WhatsAppSender {
    client: reqwest::Client,
    base_url: String,
}

impl WhatsAppSender {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{phone_number_id}/messages", self.base_url)
    }
}

#[async_trait]
impl ReplySender for WhatsAppSender {
    async fn send_text(
        &self,
        to: &str,
        message: &str,
        phone_number_id: &str,
        access_token: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": message },
        });

        let resp = self
            .client
            .post(self.messages_url(phone_number_id))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(to, error = %e, "Request error sending WhatsApp message");
                ChannelError::SendFailed {
                    name: "whatsapp".into(),
                    reason: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            error!(to, status = %status, response = %detail, "Failed to send WhatsApp message");
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("status {status}: {detail}"),
            });
        }

        info!(to, "WhatsApp message sent");
        Ok(())
    }
}
