use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::scheduling::{self, BookingRequest, DayAvailability};
use crate::state::AppState;

// GET /api/availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub business_id: String,
    pub date: String,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<DayAvailability>, AppError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(["date"]))?;
    let day = scheduling::availability(&state.db, &query.business_id, date)?;
    Ok(Json(day))
}

// POST /api/appointments
#[derive(Serialize)]
pub struct BookingCreated {
    pub id: String,
    pub start_at: String,
    pub duration_minutes: i32,
    pub status: &'static str,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingCreated>), AppError> {
    let appointment = scheduling::book(&state.db, &request, state.config.conflict_policy)
        .map_err(|e| {
            tracing::info!(business_id = %request.business_id, error = %e, "booking not committed");
            e
        })?;

    Ok((
        StatusCode::CREATED,
        Json(BookingCreated {
            id: appointment.id,
            start_at: appointment.start_at.and_utc().to_rfc3339(),
            duration_minutes: appointment.duration_minutes,
            status: appointment.status.as_str(),
        }),
    ))
}
