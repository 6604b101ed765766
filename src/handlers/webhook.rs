use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::services::router::{self, InboundMessage};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TwilioWebhookForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
}

pub fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(&str, &str)],
) -> bool {
    // URL followed by every param as key+value, sorted by key
    let mut data = url.to_string();
    let mut sorted_params = params.to_vec();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in &sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    let expected = base64::engine::general_purpose::STANDARD.encode(result);

    expected == signature
}

fn request_is_from_gateway(state: &AppState, headers: &HeaderMap, form: &TwilioWebhookForm) -> bool {
    // Dev mode: no auth token configured
    if state.config.twilio_auth_token.is_empty() {
        return true;
    }

    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if signature.is_empty() {
        tracing::warn!("missing X-Twilio-Signature header");
        return false;
    }

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let url = format!("{proto}://{host}/webhook/sms");

    let params = [
        ("From", form.from.as_str()),
        ("To", form.to.as_str()),
        ("Body", form.body.as_str()),
        ("MessageSid", form.message_sid.as_deref().unwrap_or("")),
    ];

    let valid = validate_twilio_signature(&state.config.twilio_auth_token, signature, &url, &params);
    if !valid {
        tracing::warn!("invalid Twilio signature");
    }
    valid
}

/// Inbound message webhook. Whatever happens inside, the gateway gets an empty
/// TwiML response so it never retries.
pub async fn sms_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TwilioWebhookForm>,
) -> Response {
    if !request_is_from_gateway(&state, &headers, &form) {
        return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
    }

    let from = form.from.trim().to_string();
    tracing::info!(
        from = %from,
        to = %form.to,
        sid = form.message_sid.as_deref().unwrap_or(""),
        "incoming message"
    );

    let outcome = router::route_message(
        &state,
        InboundMessage {
            text: form.body,
            sender: from,
            destination: form.to,
        },
    )
    .await;
    tracing::debug!(?outcome, "message routed");

    twiml_response()
}

fn twiml_response() -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        "<Response></Response>",
    )
        .into_response()
}
