pub mod catalog;
pub mod conversation_store;
pub mod flow;
pub mod messaging;
pub mod router;
pub mod scheduling;
