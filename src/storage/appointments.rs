use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{StoreError, StoreResult};

/// Appointment row with the counterpart names the caller is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date_time: NaiveDateTime,
    pub status: String,
    pub notes: String,
    #[serde(rename = "patientFirstName", skip_serializing_if = "Option::is_none")]
    pub patient_first_name: Option<String>,
    #[serde(rename = "patientLastName", skip_serializing_if = "Option::is_none")]
    pub patient_last_name: Option<String>,
    #[serde(rename = "doctorFirstName", skip_serializing_if = "Option::is_none")]
    pub doctor_first_name: Option<String>,
    #[serde(rename = "doctorLastName", skip_serializing_if = "Option::is_none")]
    pub doctor_last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentFields {
    pub patient_id: i64,
    pub doctor_id: i64,
    #[serde(deserialize_with = "de_date_time")]
    pub date_time: NaiveDateTime,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

const DATE_TIME_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Accepts ISO-8601 local date-times with or without seconds, `T` or space separated.
fn de_date_time<'de, D: serde::Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date_time: {}", raw)))
}

fn default_status() -> String {
    "scheduled".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentFilter {
    All,
    ForDoctor(i64),
    ForPatient(i64),
}

const BASE: &str = "a.id, a.patient_id, a.doctor_id, a.date_time, a.status, a.notes";

const ALL_SQL: &str = "SELECT a.id, a.patient_id, a.doctor_id, a.date_time, a.status, a.notes, \
     p.firstName, p.lastName, d.firstName, d.lastName \
     FROM appointment a JOIN patient p ON a.patient_id = p.id JOIN doctor d ON a.doctor_id = d.id";

fn base_row(r: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: r.get(0)?,
        patient_id: r.get(1)?,
        doctor_id: r.get(2)?,
        date_time: r.get(3)?,
        status: r.get(4)?,
        notes: r.get(5)?,
        patient_first_name: None,
        patient_last_name: None,
        doctor_first_name: None,
        doctor_last_name: None,
    })
}

fn full_row(r: &Row<'_>) -> rusqlite::Result<Appointment> {
    let mut a = base_row(r)?;
    a.patient_first_name = Some(r.get(6)?);
    a.patient_last_name = Some(r.get(7)?);
    a.doctor_first_name = Some(r.get(8)?);
    a.doctor_last_name = Some(r.get(9)?);
    Ok(a)
}

pub fn list_appointments(conn: &Connection, filter: AppointmentFilter) -> StoreResult<Vec<Appointment>> {
    let rows = match filter {
        AppointmentFilter::All => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY a.date_time, a.id", ALL_SQL))?;
            let rows = stmt.query_map([], full_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        AppointmentFilter::ForDoctor(doctor_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, p.firstName, p.lastName FROM appointment a JOIN patient p ON a.patient_id = p.id \
                 WHERE a.doctor_id = ?1 ORDER BY a.date_time, a.id",
                BASE
            ))?;
            let rows = stmt
                .query_map(params![doctor_id], |r| {
                    let mut a = base_row(r)?;
                    a.patient_first_name = Some(r.get(6)?);
                    a.patient_last_name = Some(r.get(7)?);
                    Ok(a)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        AppointmentFilter::ForPatient(patient_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, d.firstName, d.lastName FROM appointment a JOIN doctor d ON a.doctor_id = d.id \
                 WHERE a.patient_id = ?1 ORDER BY a.date_time, a.id",
                BASE
            ))?;
            let rows = stmt
                .query_map(params![patient_id], |r| {
                    let mut a = base_row(r)?;
                    a.doctor_first_name = Some(r.get(6)?);
                    a.doctor_last_name = Some(r.get(7)?);
                    Ok(a)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn get_appointment(conn: &Connection, id: i64) -> StoreResult<Appointment> {
    conn.query_row(&format!("{} WHERE a.id = ?1", ALL_SQL), params![id], full_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound("appointment not found".into()))
}

fn check_parties(conn: &Connection, f: &AppointmentFields) -> StoreResult<()> {
    let patient: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM patient WHERE id = ?1)", params![f.patient_id], |r| r.get(0))?;
    if !patient {
        return Err(StoreError::Invalid(format!("patient {} does not exist", f.patient_id)));
    }
    let doctor: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM doctor WHERE id = ?1)", params![f.doctor_id], |r| r.get(0))?;
    if !doctor {
        return Err(StoreError::Invalid(format!("doctor {} does not exist", f.doctor_id)));
    }
    if f.status.trim().is_empty() {
        return Err(StoreError::Invalid("status must not be empty".into()));
    }
    Ok(())
}

pub fn create_appointment(conn: &Connection, f: &AppointmentFields) -> StoreResult<Appointment> {
    check_parties(conn, f)?;
    conn.execute(
        "INSERT INTO appointment (patient_id, doctor_id, date_time, status, notes) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![f.patient_id, f.doctor_id, f.date_time, f.status, f.notes],
    )?;
    get_appointment(conn, conn.last_insert_rowid())
}

pub fn update_appointment(conn: &Connection, id: i64, f: &AppointmentFields) -> StoreResult<Appointment> {
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM appointment WHERE id = ?1)", params![id], |r| r.get(0))?;
    if !exists {
        return Err(StoreError::NotFound("appointment not found".into()));
    }
    check_parties(conn, f)?;
    conn.execute(
        "UPDATE appointment SET patient_id = ?1, doctor_id = ?2, date_time = ?3, status = ?4, notes = ?5 WHERE id = ?6",
        params![f.patient_id, f.doctor_id, f.date_time, f.status, f.notes, id],
    )?;
    get_appointment(conn, id)
}

pub fn delete_appointment(conn: &Connection, id: i64) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM appointment WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound("appointment not found".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::storage::{doctors, patients, schema, users};

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        schema::install(&c).unwrap();
        c
    }

    fn doctor(c: &Connection, email: &str) -> i64 {
        let u = users::create_user_hashed(c, email, "h", Role::Doctor).unwrap();
        let p = doctors::DoctorProfile { first_name: "Doc".into(), last_name: email.into(), speciality: String::new() };
        doctors::create_doctor(c, u.id, &p).unwrap().id
    }

    fn patient(c: &Connection, email: &str) -> i64 {
        let u = users::create_user_hashed(c, email, "h", Role::Patient).unwrap();
        let p = patients::PatientProfile { first_name: "Pat".into(), last_name: email.into(), phone_number: String::new() };
        patients::create_patient(c, u.id, &p).unwrap().id
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn fields(p: i64, d: i64, when: &str) -> AppointmentFields {
        AppointmentFields { patient_id: p, doctor_id: d, date_time: at(when), status: default_status(), notes: String::new() }
    }

    #[test]
    fn doctor_scope_never_leaks_other_doctors() {
        let c = conn();
        let d1 = doctor(&c, "d1@clinic.test");
        let d2 = doctor(&c, "d2@clinic.test");
        let p = patient(&c, "p@clinic.test");
        create_appointment(&c, &fields(p, d1, "2024-03-01 09:00")).unwrap();
        create_appointment(&c, &fields(p, d2, "2024-03-01 10:00")).unwrap();
        create_appointment(&c, &fields(p, d1, "2024-03-02 09:00")).unwrap();

        let mine = list_appointments(&c, AppointmentFilter::ForDoctor(d1)).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|a| a.doctor_id == d1));
        assert!(mine.iter().all(|a| a.patient_first_name.is_some() && a.doctor_first_name.is_none()));

        let for_patient = list_appointments(&c, AppointmentFilter::ForPatient(p)).unwrap();
        assert_eq!(for_patient.len(), 3);
        assert!(for_patient.iter().all(|a| a.doctor_last_name.is_some() && a.patient_last_name.is_none()));

        let all = list_appointments(&c, AppointmentFilter::All).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|a| a.patient_first_name.is_some() && a.doctor_first_name.is_some()));
    }

    #[test]
    fn parties_must_exist() {
        let c = conn();
        let d = doctor(&c, "d@clinic.test");
        assert!(matches!(create_appointment(&c, &fields(77, d, "2024-03-01 09:00")), Err(StoreError::Invalid(_))));
        let p = patient(&c, "p@clinic.test");
        assert!(matches!(create_appointment(&c, &fields(p, 78, "2024-03-01 09:00")), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn update_delete_roundtrip_and_missing() {
        let c = conn();
        let d = doctor(&c, "d@clinic.test");
        let p = patient(&c, "p@clinic.test");
        let a = create_appointment(&c, &fields(p, d, "2024-03-01 09:00")).unwrap();
        let mut f = fields(p, d, "2024-03-05 11:30");
        f.status = "done".into();
        let up = update_appointment(&c, a.id, &f).unwrap();
        assert_eq!(up.status, "done");
        assert_eq!(up.date_time, at("2024-03-05 11:30"));
        delete_appointment(&c, a.id).unwrap();
        assert!(matches!(delete_appointment(&c, a.id), Err(StoreError::NotFound(_))));
        assert!(matches!(update_appointment(&c, a.id, &f), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn date_time_input_formats() {
        for raw in ["2024-03-01T09:00", "2024-03-01T09:00:00", "2024-03-01 09:00", "2024-03-01 09:00:00"] {
            let v = serde_json::json!({"patient_id": 1, "doctor_id": 2, "date_time": raw});
            let f: AppointmentFields = serde_json::from_value(v).unwrap();
            assert_eq!(f.date_time, at("2024-03-01 09:00"), "{}", raw);
            assert_eq!(f.status, "scheduled");
        }
        let bad = serde_json::json!({"patient_id": 1, "doctor_id": 2, "date_time": "tomorrow"});
        assert!(serde_json::from_value::<AppointmentFields>(bad).is_err());
    }

    #[test]
    fn deleting_patient_cascades() {
        let c = conn();
        let d = doctor(&c, "d@clinic.test");
        let p = patient(&c, "p@clinic.test");
        create_appointment(&c, &fields(p, d, "2024-03-01 09:00")).unwrap();
        patients::delete_patient(&c, p).unwrap();
        assert!(list_appointments(&c, AppointmentFilter::All).unwrap().is_empty());
    }
}
