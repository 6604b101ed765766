pub mod twilio;

use async_trait::async_trait;

use crate::models::Business;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("messaging provider not configured")]
    NotConfigured,

    #[error("request to messaging provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("messaging provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound channel. Delivers `body` to `to` on behalf of `business` and
/// returns the provider's delivery id.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(
        &self,
        business: &Business,
        to: &str,
        body: &str,
    ) -> Result<String, SendError>;
}
