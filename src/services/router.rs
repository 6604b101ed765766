use std::sync::Arc;

use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::Business;
use crate::services::flow;
use crate::state::AppState;

/// Trailing digits compared when matching a destination to a tenant.
const TENANT_MATCH_DIGITS: usize = 10;

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub text: String,
    pub sender: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Empty text, nothing to do.
    Ignored,
    /// No business is registered at all.
    NoTenant,
    Delivered {
        business_id: String,
        delivery_id: String,
    },
    Failed,
}

pub fn trailing_digits(address: &str) -> String {
    let digits: Vec<char> = address.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(TENANT_MATCH_DIGITS);
    digits[start..].iter().collect()
}

/// Finds the business whose channel address ends in the same digits as
/// `destination`. When none matches, any business is returned instead.
pub fn resolve_tenant(conn: &Connection, destination: &str) -> anyhow::Result<Option<Business>> {
    let mut businesses = queries::list_businesses(conn)?;
    let key = trailing_digits(destination);

    if !key.is_empty() {
        if let Some(pos) = businesses
            .iter()
            .position(|b| trailing_digits(&b.channel_address) == key)
        {
            return Ok(Some(businesses.swap_remove(pos)));
        }
    }

    if businesses.is_empty() {
        return Ok(None);
    }
    // TODO: reject unmatched destinations once tenant numbers are verified at onboarding.
    let fallback = businesses.swap_remove(0);
    tracing::warn!(
        destination = %destination,
        business_id = %fallback.id,
        "no business matches destination, falling back"
    );
    Ok(Some(fallback))
}

/// Drives one inbound message end to end. Every failure is logged and turned
/// into an outcome; nothing propagates to the webhook.
pub async fn route_message(state: &Arc<AppState>, msg: InboundMessage) -> RouteOutcome {
    let text = msg.text.trim();
    if text.is_empty() {
        tracing::debug!(from = %msg.sender, "empty message, ignoring");
        return RouteOutcome::Ignored;
    }

    let business = {
        let conn = db::lock(&state.db);
        resolve_tenant(&conn, &msg.destination)
    };
    let business = match business {
        Ok(Some(b)) => b,
        Ok(None) => {
            tracing::warn!(to = %msg.destination, "no businesses registered, dropping message");
            return RouteOutcome::NoTenant;
        }
        Err(e) => {
            tracing::error!(error = %e, to = %msg.destination, "tenant lookup failed");
            return RouteOutcome::Failed;
        }
    };

    let _guard = state.sender_locks.acquire(&msg.sender).await;

    let reply = flow::process_message(
        state.conversations.as_ref(),
        &state.config.booking_base_url,
        &business,
        &msg.sender,
        text,
    )
    .await;

    match state
        .messaging
        .send_message(&business, &msg.sender, &reply)
        .await
    {
        Ok(delivery_id) => RouteOutcome::Delivered {
            business_id: business.id,
            delivery_id,
        },
        Err(e) => {
            tracing::error!(
                error = %e,
                from = %msg.sender,
                business_id = %business.id,
                "failed to send reply"
            );
            RouteOutcome::Failed
        }
    }
}
