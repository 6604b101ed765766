use std::env;

use crate::services::scheduling::ConflictPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    /// Web booking page the chat flow hands off to once name and phone are known.
    pub booking_base_url: String,
    pub conflict_policy: ConflictPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "agenda.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            booking_base_url: env::var("BOOKING_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/agendar".to_string()),
            conflict_policy: env::var("CONFLICT_POLICY")
                .map(|v| ConflictPolicy::parse(&v))
                .unwrap_or_default(),
        }
    }
}
