use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use super::WeeklyHours;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub category: BusinessCategory,
    pub name: String,
    /// Inbound channel address (the number customers write to).
    pub channel_address: String,
    /// Fixed offset of the tenant's local time from UTC.
    pub utc_offset_minutes: i32,
    pub address: Option<String>,
    pub services: Vec<Service>,
    pub hours: WeeklyHours,
    pub created_at: NaiveDateTime,
}

impl Business {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn find_service(&self, name: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub name: String,
    pub price: f64,
    pub duration_minutes: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessCategory {
    Dental,
    Beauty,
    Health,
    Fitness,
    Automotive,
    Other,
}

impl BusinessCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessCategory::Dental => "dental",
            BusinessCategory::Beauty => "beauty",
            BusinessCategory::Health => "health",
            BusinessCategory::Fitness => "fitness",
            BusinessCategory::Automotive => "automotive",
            BusinessCategory::Other => "other",
        }
    }

    /// Translates the free-text labels admins type in (English or Spanish).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "dental" | "dentist" | "dentista" | "consultorio dental" => BusinessCategory::Dental,
            "beauty" | "salon" | "salón" | "belleza" | "barberia" | "barbería" | "estetica"
            | "estética" => BusinessCategory::Beauty,
            "health" | "salud" | "clinic" | "clinica" | "clínica" | "medico" | "médico" => {
                BusinessCategory::Health
            }
            "fitness" | "gym" | "gimnasio" => BusinessCategory::Fitness,
            "automotive" | "taller" | "mecanico" | "mecánico" => BusinessCategory::Automotive,
            _ => BusinessCategory::Other,
        }
    }
}

/// Formats a price without trailing decimals when it is a whole amount.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("${price:.0}")
    } else {
        format!("${price:.2}")
    }
}
