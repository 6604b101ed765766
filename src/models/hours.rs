use chrono::Weekday;
use serde::{Deserialize, Serialize};

const DAY_ORDER: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
const DAY_NAMES_ES: [&str; 7] = [
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
    "Domingo",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayHours {
    pub day: String,
    pub open: String,
    pub close: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Weekly opening hours table, one entry per weekday the business configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeeklyHours {
    pub days: Vec<DayHours>,
}

impl WeeklyHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: WeeklyHours = serde_json::from_str(s)?;
        hours.validate()?;
        Ok(hours)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for day in &self.days {
            day_index(&day.day)?;
            parse_time(&day.open)?;
            parse_time(&day.close)?;
        }
        Ok(())
    }

    /// Opening hours for `weekday`, `None` when the business is closed that day.
    pub fn for_weekday(&self, weekday: Weekday) -> Option<&DayHours> {
        let key = DAY_ORDER[weekday.num_days_from_monday() as usize];
        self.days
            .iter()
            .find(|d| d.active && d.day.to_lowercase() == key)
    }

    pub fn to_human_readable(&self) -> String {
        let mut active: Vec<&DayHours> = self.days.iter().filter(|d| d.active).collect();
        active.sort_by_key(|d| day_index(&d.day).unwrap_or(7));

        active
            .iter()
            .map(|d| {
                let name = day_index(&d.day)
                    .map(|i| DAY_NAMES_ES[i])
                    .unwrap_or("?");
                format!("{name}: {}-{}", d.open, d.close)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn day_index(s: &str) -> anyhow::Result<usize> {
    let lower = s.to_lowercase();
    DAY_ORDER
        .iter()
        .position(|d| *d == lower)
        .ok_or_else(|| anyhow::anyhow!("invalid weekday: {s}"))
}

fn parse_time(s: &str) -> anyhow::Result<()> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    if hour > 23 || minute > 59 {
        return Err(anyhow::anyhow!("time out of range: {s}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"},{"day":"sat","open":"10:00","close":"14:00","active":false}]}"#;
        let hours = WeeklyHours::from_json(json).unwrap();
        assert_eq!(hours.days.len(), 2);
        assert!(hours.days[0].active);
        assert!(!hours.days[1].active);
    }

    #[test]
    fn test_parse_invalid_day() {
        let json = r#"{"days":[{"day":"xyz","open":"09:00","close":"17:00"}]}"#;
        assert!(WeeklyHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_invalid_time() {
        let json = r#"{"days":[{"day":"mon","open":"25:00","close":"17:00"}]}"#;
        assert!(WeeklyHours::from_json(json).is_err());
    }

    #[test]
    fn test_for_weekday_skips_inactive() {
        let json = r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"},{"day":"sat","open":"10:00","close":"14:00","active":false}]}"#;
        let hours = WeeklyHours::from_json(json).unwrap();
        assert_eq!(hours.for_weekday(Weekday::Mon).unwrap().open, "09:00");
        assert!(hours.for_weekday(Weekday::Sat).is_none());
        assert!(hours.for_weekday(Weekday::Sun).is_none());
    }

    #[test]
    fn test_to_human_readable_sorted() {
        let json = r#"{"days":[{"day":"fri","open":"10:00","close":"16:00"},{"day":"mon","open":"09:00","close":"17:00"}]}"#;
        let hours = WeeklyHours::from_json(json).unwrap();
        assert_eq!(
            hours.to_human_readable(),
            "Lunes: 09:00-17:00\nViernes: 10:00-16:00"
        );
    }

    #[test]
    fn test_to_human_readable_empty() {
        assert_eq!(WeeklyHours::default().to_human_readable(), "");
    }
}
