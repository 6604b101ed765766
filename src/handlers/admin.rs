use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus, Business, BusinessCategory, Service, WeeklyHours};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// PUT /api/admin/businesses
#[derive(Deserialize)]
pub struct BusinessPayload {
    pub id: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channel_address: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub address: Option<String>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub hours: WeeklyHours,
}

impl BusinessPayload {
    fn into_business(self) -> Result<Business, AppError> {
        let mut invalid = vec![];
        if self.name.trim().is_empty() {
            invalid.push("name".to_string());
        }
        if self.channel_address.trim().is_empty() {
            invalid.push("channel_address".to_string());
        }
        if !(-12 * 60..=14 * 60).contains(&self.utc_offset_minutes) {
            invalid.push("utc_offset_minutes".to_string());
        }
        if self.hours.validate().is_err() {
            invalid.push("hours".to_string());
        }
        for (i, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() || service.duration_minutes <= 0 || service.price < 0.0 {
                invalid.push(format!("services[{i}]"));
            }
        }
        if !invalid.is_empty() {
            return Err(AppError::Validation { fields: invalid });
        }

        Ok(Business {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            category: BusinessCategory::parse(&self.category),
            name: self.name.trim().to_string(),
            channel_address: self.channel_address.trim().to_string(),
            utc_offset_minutes: self.utc_offset_minutes,
            address: self.address,
            services: self.services,
            hours: self.hours,
            created_at: Utc::now().naive_utc(),
        })
    }
}

pub async fn upsert_business(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BusinessPayload>,
) -> Result<Json<Business>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let business = payload.into_business()?;
    let conn = db::lock(&state.db);
    queries::upsert_business(&conn, &business)?;
    let stored = queries::get_business(&conn, &business.id)?
        .ok_or_else(|| AppError::Logic(format!("business {} vanished after upsert", business.id)))?;

    tracing::info!(business_id = %stored.id, services = stored.services.len(), "business saved");
    Ok(Json(stored))
}

// GET /api/admin/businesses
pub async fn list_businesses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Business>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let conn = db::lock(&state.db);
    Ok(Json(queries::list_businesses(&conn)?))
}

// DELETE /api/admin/businesses/:id
pub async fn delete_business(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let conn = db::lock(&state.db);
    if !queries::delete_business(&conn, &id)? {
        return Err(AppError::NotFound(format!("business {id}")));
    }
    // Separate statement: a failure here leaves orphaned appointments behind.
    let removed = queries::delete_appointments_for_business(&conn, &id).map_err(|e| {
        tracing::error!(error = %e, business_id = %id, "business deleted but appointments were not");
        e
    })?;

    tracing::info!(business_id = %id, appointments = removed, "business deleted");
    Ok(Json(json!({ "ok": true, "appointments_deleted": removed })))
}

// POST /api/admin/businesses/:id/services/:position
#[derive(Deserialize)]
pub struct ServiceUpdate {
    pub active: Option<bool>,
    pub category: Option<String>,
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, position)): Path<(String, i64)>,
    Json(update): Json<ServiceUpdate>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if update.active.is_none() && update.category.is_none() {
        return Err(AppError::validation(["active", "category"]));
    }

    let conn = db::lock(&state.db);
    let mut found = true;
    if let Some(active) = update.active {
        found &= queries::set_service_active(&conn, &id, position, active)?;
    }
    if let Some(category) = update.category.as_deref() {
        let category = Some(category.trim()).filter(|c| !c.is_empty());
        found &= queries::set_service_category(&conn, &id, position, category)?;
    }
    if !found {
        return Err(AppError::NotFound(format!("service {position} of business {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

// GET /api/admin/businesses/:id/appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let conn = db::lock(&state.db);
    if queries::get_business(&conn, &id)?.is_none() {
        return Err(AppError::NotFound(format!("business {id}")));
    }
    Ok(Json(queries::list_appointments(&conn, &id)?))
}

// POST /api/admin/appointments/:id/status
#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = AppointmentStatus::parse(&update.status).ok_or_else(|| AppError::validation(["status"]))?;
    let conn = db::lock(&state.db);
    if !queries::update_appointment_status(&conn, &id, status)? {
        return Err(AppError::NotFound(format!("appointment {id}")));
    }
    Ok(Json(json!({ "ok": true, "status": status.as_str() })))
}
