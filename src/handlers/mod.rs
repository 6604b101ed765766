pub mod admin;
pub mod booking;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook/sms", post(webhook::sms_webhook))
        .route("/api/availability", get(booking::get_availability))
        .route("/api/appointments", post(booking::create_appointment))
        .route(
            "/api/admin/businesses",
            put(admin::upsert_business).get(admin::list_businesses),
        )
        .route(
            "/api/admin/businesses/:id",
            axum::routing::delete(admin::delete_business),
        )
        .route(
            "/api/admin/businesses/:id/services/:position",
            post(admin::update_service),
        )
        .route(
            "/api/admin/businesses/:id/appointments",
            get(admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/:id/status",
            post(admin::update_appointment_status),
        )
        .with_state(state)
}
