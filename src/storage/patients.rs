use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::doctors::user_role;
use super::{StoreError, StoreResult};
use crate::identity::Role;

/// Patient profile joined with the owning user's email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Which patient rows a read may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientFilter {
    All,
    /// Patients with at least one appointment with this doctor.
    SeenByDoctor(i64),
    /// Explicit id set, e.g. from the accompaniment lookup. Empty means no rows.
    Ids(Vec<i64>),
}

const COLUMNS: &str = "p.id, p.firstName, p.lastName, p.phoneNumber, u.email";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient { id: r.get(0)?, first_name: r.get(1)?, last_name: r.get(2)?, phone_number: r.get(3)?, email: r.get(4)? })
}

pub fn list_patients(conn: &Connection, filter: &PatientFilter) -> StoreResult<Vec<Patient>> {
    let rows = match filter {
        PatientFilter::All => {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM patient p JOIN user u ON p.id = u.id ORDER BY p.id", COLUMNS))?;
            let rows = stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        PatientFilter::SeenByDoctor(doctor_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT {} FROM patient p JOIN user u ON p.id = u.id \
                 JOIN appointment a ON p.id = a.patient_id WHERE a.doctor_id = ?1 ORDER BY p.id",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![doctor_id], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        PatientFilter::Ids(ids) => {
            if ids.is_empty() { return Ok(Vec::new()); }
            let marks = vec!["?"; ids.len()].join(",");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM patient p JOIN user u ON p.id = u.id WHERE p.id IN ({}) ORDER BY p.id",
                COLUMNS, marks
            ))?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn get_patient(conn: &Connection, id: i64) -> StoreResult<Patient> {
    conn.query_row(
        &format!("SELECT {} FROM patient p JOIN user u ON p.id = u.id WHERE p.id = ?1", COLUMNS),
        params![id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound("patient not found".into()))
}

/// Attach a patient profile to an existing user holding the patient role.
pub fn create_patient(conn: &Connection, id: i64, profile: &PatientProfile) -> StoreResult<Patient> {
    match user_role(conn, id)? {
        Some(Role::Patient) => {}
        Some(other) => return Err(StoreError::Invalid(format!("user {} has role {}, expected patient", id, other))),
        None => return Err(StoreError::Invalid(format!("user {} does not exist", id))),
    }
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM patient WHERE id = ?1)", params![id], |r| r.get(0))?;
    if exists {
        return Err(StoreError::Invalid(format!("patient {} already exists", id)));
    }
    conn.execute(
        "INSERT INTO patient (id, firstName, lastName, phoneNumber) VALUES (?1, ?2, ?3, ?4)",
        params![id, profile.first_name, profile.last_name, profile.phone_number],
    )?;
    get_patient(conn, id)
}

pub fn update_patient(conn: &Connection, id: i64, profile: &PatientProfile) -> StoreResult<Patient> {
    let n = conn.execute(
        "UPDATE patient SET firstName = ?1, lastName = ?2, phoneNumber = ?3 WHERE id = ?4",
        params![profile.first_name, profile.last_name, profile.phone_number, id],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("patient not found".into()));
    }
    get_patient(conn, id)
}

pub fn delete_patient(conn: &Connection, id: i64) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM patient WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound("patient not found".into()));
    }
    Ok(())
}
