use std::sync::{Arc, Mutex};

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use agenda::config::AppConfig;
use agenda::db;
use agenda::handlers;
use agenda::services::conversation_store::{InMemoryConversationStore, SenderLocks};
use agenda::services::messaging::twilio::TwilioSmsProvider;
use agenda::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.twilio_account_sid.is_empty() {
        tracing::warn!("TWILIO_ACCOUNT_SID not set, replies will not be delivered");
    }
    let messaging = TwilioSmsProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
    );
    tracing::info!(policy = ?config.conflict_policy, "booking conflict policy");

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        messaging: Box::new(messaging),
        conversations: Box::new(InMemoryConversationStore::new()),
        sender_locks: SenderLocks::new(),
    });

    let app = handlers::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
