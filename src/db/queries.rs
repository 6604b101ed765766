use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Appointment, AppointmentSource, AppointmentStatus, Business, BusinessCategory, Service,
    WeeklyHours,
};

pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Reads a timestamp column, failing the row when the stored text is malformed.
fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ── Businesses ──

/// Inserts or replaces a business together with its catalog. The creation
/// timestamp of an existing business is kept.
pub fn upsert_business(conn: &Connection, business: &Business) -> anyhow::Result<()> {
    let hours_json = serde_json::to_string(&business.hours)?;
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO businesses (id, category, name, channel_address, utc_offset_minutes, address, hours, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
           category = excluded.category,
           name = excluded.name,
           channel_address = excluded.channel_address,
           utc_offset_minutes = excluded.utc_offset_minutes,
           address = excluded.address,
           hours = excluded.hours",
        params![
            business.id,
            business.category.as_str(),
            business.name,
            business.channel_address,
            business.utc_offset_minutes,
            business.address,
            hours_json,
            fmt_ts(&business.created_at),
        ],
    )?;

    tx.execute(
        "DELETE FROM services WHERE business_id = ?1",
        params![business.id],
    )?;
    for (position, service) in business.services.iter().enumerate() {
        tx.execute(
            "INSERT INTO services (business_id, position, name, price, duration_minutes, active, category, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                business.id,
                position as i64,
                service.name,
                service.price,
                service.duration_minutes,
                service.active as i32,
                service.category,
                service.description,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn get_business(conn: &Connection, id: &str) -> anyhow::Result<Option<Business>> {
    let row = conn
        .query_row(
            "SELECT id, category, name, channel_address, utc_offset_minutes, address, hours, created_at
             FROM businesses WHERE id = ?1",
            params![id],
            parse_business_row,
        )
        .optional()?;

    match row {
        Some(mut business) => {
            business.services = load_services(conn, &business.id)?;
            Ok(Some(business))
        }
        None => Ok(None),
    }
}

/// All businesses, oldest first.
pub fn list_businesses(conn: &Connection) -> anyhow::Result<Vec<Business>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, name, channel_address, utc_offset_minutes, address, hours, created_at
         FROM businesses ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], parse_business_row)?;

    let mut businesses = vec![];
    for row in rows {
        let mut business = row?;
        business.services = load_services(conn, &business.id)?;
        businesses.push(business);
    }
    Ok(businesses)
}

pub fn delete_business(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM businesses WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn set_service_active(
    conn: &Connection,
    business_id: &str,
    position: i64,
    active: bool,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET active = ?1 WHERE business_id = ?2 AND position = ?3",
        params![active as i32, business_id, position],
    )?;
    Ok(count > 0)
}

pub fn set_service_category(
    conn: &Connection,
    business_id: &str,
    position: i64,
    category: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET category = ?1 WHERE business_id = ?2 AND position = ?3",
        params![category, business_id, position],
    )?;
    Ok(count > 0)
}

fn load_services(conn: &Connection, business_id: &str) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT name, price, duration_minutes, active, category, description
         FROM services WHERE business_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![business_id], |row| {
        Ok(Service {
            name: row.get(0)?,
            price: row.get(1)?,
            duration_minutes: row.get(2)?,
            active: row.get::<_, i32>(3)? != 0,
            category: row.get(4)?,
            description: row.get(5)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

fn parse_business_row(row: &rusqlite::Row) -> rusqlite::Result<Business> {
    let category: String = row.get(1)?;
    let hours_json: String = row.get(6)?;

    let hours = WeeklyHours::from_json(&hours_json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored business hours are invalid, treating as empty");
        WeeklyHours::default()
    });

    Ok(Business {
        id: row.get(0)?,
        category: BusinessCategory::parse(&category),
        name: row.get(2)?,
        channel_address: row.get(3)?,
        utc_offset_minutes: row.get(4)?,
        address: row.get(5)?,
        services: vec![],
        hours,
        created_at: get_ts(row, 7)?,
    })
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, business_id, client_name, client_phone, service, start_at, duration_minutes, status, source, created_at, updated_at";

pub fn create_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, business_id, client_name, client_phone, service, start_at, duration_minutes, status, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            appointment.id,
            appointment.business_id,
            appointment.client_name,
            appointment.client_phone,
            appointment.service,
            fmt_ts(&appointment.start_at),
            appointment.duration_minutes,
            appointment.status.as_str(),
            appointment.source.as_str(),
            fmt_ts(&appointment.created_at),
            fmt_ts(&appointment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(
    conn: &Connection,
    business_id: &str,
    id: &str,
) -> anyhow::Result<Option<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE business_id = ?1 AND id = ?2"
    );
    let appointment = conn
        .query_row(&sql, params![business_id, id], parse_appointment_row)
        .optional()?;
    Ok(appointment)
}

pub fn get_appointment_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    let appointment = conn
        .query_row(&sql, params![id], parse_appointment_row)
        .optional()?;
    Ok(appointment)
}

/// Every appointment of a business, any status, ordered by start.
pub fn list_appointments(conn: &Connection, business_id: &str) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE business_id = ?1 ORDER BY start_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![business_id], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

/// Non-cancelled appointments of a business starting in `[start, end)` (UTC).
pub fn active_appointments_in_range(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE business_id = ?1 AND start_at >= ?2 AND start_at < ?3 AND status != 'cancelled'
         ORDER BY start_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![business_id, fmt_ts(start), fmt_ts(end)],
        parse_appointment_row,
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let now = fmt_ts(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

pub fn delete_appointments_for_business(
    conn: &Connection,
    business_id: &str,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM appointments WHERE business_id = ?1",
        params![business_id],
    )?;
    Ok(count)
}

fn parse_appointment_row(row: &rusqlite::Row) -> rusqlite::Result<Appointment> {
    let status: String = row.get(7)?;
    let source: String = row.get(8)?;

    Ok(Appointment {
        id: row.get(0)?,
        business_id: row.get(1)?,
        client_name: row.get(2)?,
        client_phone: row.get(3)?,
        service: row.get(4)?,
        start_at: get_ts(row, 5)?,
        duration_minutes: row.get(6)?,
        status: AppointmentStatus::parse(&status).unwrap_or(AppointmentStatus::Pending),
        source: AppointmentSource::parse(&source),
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db;
    use crate::models::DayHours;

    pub(crate) fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    pub(crate) fn sample_business(id: &str, channel: &str) -> Business {
        Business {
            id: id.to_string(),
            category: BusinessCategory::Dental,
            name: format!("Clinic {id}"),
            channel_address: channel.to_string(),
            utc_offset_minutes: 0,
            address: Some("Av. Reforma 1".to_string()),
            services: vec![
                Service {
                    name: "Cleaning".to_string(),
                    price: 500.0,
                    duration_minutes: 30,
                    active: true,
                    category: None,
                    description: None,
                },
                Service {
                    name: "Extraction".to_string(),
                    price: 800.0,
                    duration_minutes: 60,
                    active: true,
                    category: None,
                    description: None,
                },
            ],
            hours: WeeklyHours {
                days: vec![DayHours {
                    day: "mon".to_string(),
                    open: "09:00".to_string(),
                    close: "18:00".to_string(),
                    active: true,
                }],
            },
            created_at: Utc::now().naive_utc(),
        }
    }

    pub(crate) fn sample_appointment(business_id: &str, start: &str) -> Appointment {
        let now = Utc::now().naive_utc();
        Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            client_name: "Alice".to_string(),
            client_phone: "5551110000".to_string(),
            service: "Cleaning".to_string(),
            start_at: dt(start),
            duration_minutes: 30,
            status: AppointmentStatus::Confirmed,
            source: AppointmentSource::Web,
            created_at: now,
            updated_at: now,
        }
    }

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_business_round_trip_keeps_service_order() {
        let conn = setup_db();
        upsert_business(&conn, &sample_business("b1", "+15550001111")).unwrap();

        let loaded = get_business(&conn, "b1").unwrap().unwrap();
        assert_eq!(loaded.category, BusinessCategory::Dental);
        let names: Vec<_> = loaded.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Cleaning", "Extraction"]);
        assert_eq!(loaded.hours.days.len(), 1);
    }

    #[test]
    fn test_upsert_replaces_catalog() {
        let conn = setup_db();
        let mut business = sample_business("b1", "+15550001111");
        upsert_business(&conn, &business).unwrap();

        business.services.remove(0);
        business.name = "Renamed".to_string();
        upsert_business(&conn, &business).unwrap();

        let loaded = get_business(&conn, "b1").unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.services.len(), 1);
        assert_eq!(loaded.services[0].name, "Extraction");
    }

    #[test]
    fn test_missing_business() {
        let conn = setup_db();
        assert!(get_business(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_service_flags() {
        let conn = setup_db();
        upsert_business(&conn, &sample_business("b1", "+15550001111")).unwrap();

        assert!(set_service_active(&conn, "b1", 0, false).unwrap());
        assert!(set_service_category(&conn, "b1", 1, Some("surgery")).unwrap());
        assert!(!set_service_active(&conn, "b1", 9, false).unwrap());

        let loaded = get_business(&conn, "b1").unwrap().unwrap();
        assert!(!loaded.services[0].active);
        assert_eq!(loaded.services[1].category.as_deref(), Some("surgery"));
    }

    #[test]
    fn test_active_appointments_in_range_excludes_cancelled() {
        let conn = setup_db();
        let keep = sample_appointment("b1", "2025-06-16 10:00");
        let mut cancelled = sample_appointment("b1", "2025-06-16 11:00");
        cancelled.status = AppointmentStatus::Cancelled;
        let other_tenant = sample_appointment("b2", "2025-06-16 10:00");
        for a in [&keep, &cancelled, &other_tenant] {
            create_appointment(&conn, a).unwrap();
        }

        let found = active_appointments_in_range(
            &conn,
            "b1",
            &dt("2025-06-16 00:00"),
            &dt("2025-06-17 00:00"),
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, keep.id);
    }

    #[test]
    fn test_get_and_update_appointment() {
        let conn = setup_db();
        let appt = sample_appointment("b1", "2025-06-16 10:00");
        create_appointment(&conn, &appt).unwrap();

        assert!(get_appointment(&conn, "b2", &appt.id).unwrap().is_none());
        let loaded = get_appointment(&conn, "b1", &appt.id).unwrap().unwrap();
        assert_eq!(loaded.start_at, dt("2025-06-16 10:00"));

        assert!(update_appointment_status(&conn, &appt.id, AppointmentStatus::NoShow).unwrap());
        let loaded = get_appointment_by_id(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(loaded.status, AppointmentStatus::NoShow);
    }

    #[test]
    fn test_corrupt_timestamp_fails_the_row() {
        let conn = setup_db();
        let appt = sample_appointment("b1", "2025-06-16 10:00");
        create_appointment(&conn, &appt).unwrap();
        conn.execute(
            "UPDATE appointments SET start_at = 'sometime' WHERE id = ?1",
            params![appt.id],
        )
        .unwrap();

        let err = get_appointment_by_id(&conn, &appt.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::FromSqlConversionFailure(5, Type::Text, _))
        ));
        assert!(list_appointments(&conn, "b1").is_err());

        upsert_business(&conn, &sample_business("b1", "+15550001111")).unwrap();
        conn.execute("UPDATE businesses SET created_at = '' WHERE id = 'b1'", [])
            .unwrap();
        assert!(get_business(&conn, "b1").is_err());
    }

    #[test]
    fn test_delete_business_and_its_appointments() {
        let conn = setup_db();
        upsert_business(&conn, &sample_business("b1", "+15550001111")).unwrap();
        create_appointment(&conn, &sample_appointment("b1", "2025-06-16 10:00")).unwrap();
        create_appointment(&conn, &sample_appointment("b1", "2025-06-16 12:00")).unwrap();
        create_appointment(&conn, &sample_appointment("b2", "2025-06-16 12:00")).unwrap();

        assert!(delete_business(&conn, "b1").unwrap());
        assert_eq!(delete_appointments_for_business(&conn, "b1").unwrap(), 2);
        assert!(list_appointments(&conn, "b1").unwrap().is_empty());
        assert_eq!(list_appointments(&conn, "b2").unwrap().len(), 1);
        assert!(get_business(&conn, "b1").unwrap().is_none());
    }
}
