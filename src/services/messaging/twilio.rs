use async_trait::async_trait;
use serde::Deserialize;

use super::{MessagingProvider, SendError};
use crate::models::Business;

/// Twilio Messages API. One account serves every tenant; each message is sent
/// from the tenant's own channel address.
pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

impl TwilioSmsProvider {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            account_sid,
            auth_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(
        &self,
        business: &Business,
        to: &str,
        body: &str,
    ) -> Result<String, SendError> {
        if self.account_sid.is_empty() {
            return Err(SendError::NotConfigured);
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", business.channel_address.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResource = response.json().await?;
        tracing::debug!(business_id = %business.id, sid = %message.sid, "message queued");
        Ok(message.sid)
    }
}
