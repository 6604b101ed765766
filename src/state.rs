use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::conversation_store::{ConversationStore, SenderLocks};
use crate::services::messaging::MessagingProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub messaging: Box<dyn MessagingProvider>,
    pub conversations: Box<dyn ConversationStore>,
    pub sender_locks: SenderLocks,
}
