use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentSource, AppointmentStatus, Business};

pub const MIN_PHONE_DIGITS: usize = 10;
const DEFAULT_DURATION_MINUTES: i32 = 60;

/// How two appointments of the same business are judged to collide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Same local clock hour (minute 00-59), regardless of duration.
    #[default]
    HourBucket,
    /// Real `[start, start + duration)` overlap.
    Interval,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "interval" | "overlap" => ConflictPolicy::Interval,
            _ => ConflictPolicy::HourBucket,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub business_id: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub start: String,
    pub duration_minutes: Option<i32>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub occupied: BTreeSet<String>,
    pub open: Option<String>,
    pub close: Option<String>,
}

pub fn canonical_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn to_local(utc: NaiveDateTime, offset: FixedOffset) -> Option<NaiveDateTime> {
    utc.checked_add_signed(Duration::seconds(offset.local_minus_utc() as i64))
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> Option<NaiveDateTime> {
    local.checked_sub_signed(Duration::seconds(offset.local_minus_utc() as i64))
}

/// Parses a requested start. RFC 3339 input carries its own offset; naive
/// input is read as the business's local time. Returns UTC, or `None` when
/// the input is malformed or falls outside the representable range.
pub fn parse_start(raw: &str, offset: FixedOffset) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|local| to_utc(local, offset))
}

/// UTC range `[start, end)` of the local clock hour containing `start_utc`.
pub fn hour_bucket(
    start_utc: NaiveDateTime,
    offset: FixedOffset,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let local = to_local(start_utc, offset)?;
    let local_hour = local
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local);
    let start = to_utc(local_hour, offset)?;
    Some((start, start.checked_add_signed(Duration::hours(1))?))
}

/// Whether every window the conflict check derives from `start_at` exists.
fn slot_in_range(start_at: NaiveDateTime, duration_minutes: i32, offset: FixedOffset) -> bool {
    hour_bucket(start_at, offset).is_some()
        && start_at
            .checked_add_signed(Duration::minutes(duration_minutes as i64))
            .is_some()
        && start_at.checked_sub_signed(Duration::days(1)).is_some()
}

/// UTC range `[start, end)` covering the local calendar day `date`.
fn day_range(date: NaiveDate, offset: FixedOffset) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = to_utc(date.and_hms_opt(0, 0, 0)?, offset)?;
    Some((start, start.checked_add_signed(Duration::days(1))?))
}

#[derive(Debug, Clone, PartialEq)]
struct ValidatedBooking {
    client_name: String,
    client_phone: String,
    service: String,
    start_at: NaiveDateTime,
    duration_minutes: i32,
    source: AppointmentSource,
}

fn validate(business: &Business, request: &BookingRequest) -> Result<ValidatedBooking, AppError> {
    let mut invalid = vec![];

    let client_name = request.client_name.trim().to_string();
    if client_name.is_empty() {
        invalid.push("client_name");
    }
    let client_phone = canonical_phone(&request.client_phone);
    if client_phone.len() < MIN_PHONE_DIGITS {
        invalid.push("client_phone");
    }
    let service = request.service.trim().to_string();
    if service.is_empty() {
        invalid.push("service");
    }
    let duration_minutes = request
        .duration_minutes
        .or_else(|| business.find_service(&service).map(|s| s.duration_minutes))
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    let start_at = parse_start(&request.start, business.offset())
        .filter(|&s| slot_in_range(s, duration_minutes.max(0), business.offset()));
    if start_at.is_none() {
        invalid.push("start");
    }
    if matches!(request.duration_minutes, Some(d) if d <= 0) {
        invalid.push("duration_minutes");
    }

    match start_at {
        Some(start_at) if invalid.is_empty() => {
            Ok(ValidatedBooking {
                client_name,
                client_phone,
                service,
                start_at,
                duration_minutes,
                source: request
                    .source
                    .as_deref()
                    .map(AppointmentSource::parse)
                    .unwrap_or(AppointmentSource::Web),
            })
        }
        _ => Err(AppError::validation(invalid)),
    }
}

/// First non-cancelled appointment of `business` that collides with the
/// requested slot under `policy`.
pub fn find_conflict(
    conn: &Connection,
    business: &Business,
    start_at: NaiveDateTime,
    duration_minutes: i32,
    policy: ConflictPolicy,
) -> anyhow::Result<Option<Appointment>> {
    match policy {
        ConflictPolicy::HourBucket => {
            let (from, to) = hour_bucket(start_at, business.offset())
                .ok_or_else(|| anyhow::anyhow!("hour bucket of {start_at} is out of range"))?;
            let existing = queries::active_appointments_in_range(conn, &business.id, &from, &to)?;
            Ok(existing.into_iter().next())
        }
        ConflictPolicy::Interval => {
            let out_of_range = || anyhow::anyhow!("interval around {start_at} is out of range");
            let end_at = start_at
                .checked_add_signed(Duration::minutes(duration_minutes as i64))
                .ok_or_else(out_of_range)?;
            // Appointments longer than a day are not looked back for.
            let from = start_at
                .checked_sub_signed(Duration::days(1))
                .ok_or_else(out_of_range)?;
            let existing = queries::active_appointments_in_range(conn, &business.id, &from, &end_at)?;
            Ok(existing
                .into_iter()
                .find(|a| a.start_at < end_at && a.end_at() > start_at))
        }
    }
}

/// Validates the request, then checks for a conflict and inserts a confirmed
/// appointment inside one `BEGIN IMMEDIATE` transaction, so concurrent commits
/// for the same slot (even from other connections) see each other's writes.
pub fn commit_booking(
    conn: &mut Connection,
    business: &Business,
    request: &BookingRequest,
    policy: ConflictPolicy,
) -> Result<Appointment, AppError> {
    let booking = validate(business, request)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = find_conflict(
        &tx,
        business,
        booking.start_at,
        booking.duration_minutes,
        policy,
    )? {
        let local = to_local(existing.start_at, business.offset()).unwrap_or(existing.start_at);
        tracing::info!(
            business_id = %business.id,
            existing_id = %existing.id,
            requested = %booking.start_at,
            "booking rejected, slot taken"
        );
        return Err(AppError::Conflict(format!(
            "slot already taken by an appointment at {}",
            local.format("%Y-%m-%d %H:%M")
        )));
    }

    let now = Utc::now().naive_utc();
    let appointment = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        business_id: business.id.clone(),
        client_name: booking.client_name,
        client_phone: booking.client_phone,
        service: booking.service,
        start_at: booking.start_at,
        duration_minutes: booking.duration_minutes,
        status: AppointmentStatus::Confirmed,
        source: booking.source,
        created_at: now,
        updated_at: now,
    };
    queries::create_appointment(&tx, &appointment)?;
    tx.commit()?;

    tracing::info!(
        business_id = %business.id,
        appointment_id = %appointment.id,
        start_at = %appointment.start_at,
        "appointment booked"
    );
    Ok(appointment)
}

/// "HH:MM" start times, local to the business, of every non-cancelled
/// appointment on `date`. Advisory only: the commit path re-checks.
pub fn occupied_times(
    conn: &Connection,
    business: &Business,
    date: NaiveDate,
) -> anyhow::Result<BTreeSet<String>> {
    let offset = business.offset();
    let (day_start, day_end) =
        day_range(date, offset).ok_or_else(|| anyhow::anyhow!("day {date} is out of range"))?;

    let appointments = queries::active_appointments_in_range(conn, &business.id, &day_start, &day_end)?;
    Ok(appointments
        .iter()
        .filter_map(|a| to_local(a.start_at, offset))
        .map(|local| local.format("%H:%M").to_string())
        .collect())
}

pub fn day_availability(
    conn: &Connection,
    business: &Business,
    date: NaiveDate,
) -> anyhow::Result<DayAvailability> {
    let occupied = occupied_times(conn, business, date)?;
    let hours = business.hours.for_weekday(chrono::Datelike::weekday(&date));
    Ok(DayAvailability {
        date,
        occupied,
        open: hours.map(|h| h.open.clone()),
        close: hours.map(|h| h.close.clone()),
    })
}

fn load_business(conn: &Connection, business_id: &str) -> Result<Business, AppError> {
    queries::get_business(conn, business_id)?
        .ok_or_else(|| AppError::NotFound(format!("business {business_id}")))
}

/// Resolves the business and commits the booking on the shared connection.
pub fn book(
    db: &Mutex<Connection>,
    request: &BookingRequest,
    policy: ConflictPolicy,
) -> Result<Appointment, AppError> {
    let mut conn = db::lock(db);
    let business = load_business(&conn, &request.business_id)?;
    commit_booking(&mut conn, &business, request, policy)
}

pub fn availability(
    db: &Mutex<Connection>,
    business_id: &str,
    date: NaiveDate,
) -> Result<DayAvailability, AppError> {
    let conn = db::lock(db);
    let business = load_business(&conn, business_id)?;
    if day_range(date, business.offset()).is_none() {
        return Err(AppError::validation(["date"]));
    }
    Ok(day_availability(&conn, &business, date)?)
}
