use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A booked slot. `start_at` is stored in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub business_id: String,
    pub client_name: String,
    pub client_phone: String,
    pub service: String,
    pub start_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub source: AppointmentSource,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn end_at(&self) -> NaiveDateTime {
        self.start_at
            .checked_add_signed(chrono::Duration::minutes(self.duration_minutes as i64))
            .unwrap_or(NaiveDateTime::MAX)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" | "canceled" => Some(AppointmentStatus::Cancelled),
            "completed" => Some(AppointmentStatus::Completed),
            "no_show" | "noshow" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }
}

/// Where the appointment was created from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSource {
    Chat,
    Web,
    Admin,
}

impl AppointmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentSource::Chat => "chat",
            AppointmentSource::Web => "web",
            AppointmentSource::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "chat" | "whatsapp" | "sms" => AppointmentSource::Chat,
            "admin" | "dashboard" => AppointmentSource::Admin,
            _ => AppointmentSource::Web,
        }
    }
}
