use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{StoreError, StoreResult};
use crate::identity::Role;

/// Doctor profile joined with the owning user's email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub speciality: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub speciality: String,
}

const SELECT: &str = "SELECT d.id, d.firstName, d.lastName, d.speciality, u.email FROM doctor d JOIN user u ON d.id = u.id";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor { id: r.get(0)?, first_name: r.get(1)?, last_name: r.get(2)?, speciality: r.get(3)?, email: r.get(4)? })
}

pub(crate) fn user_role(conn: &Connection, id: i64) -> StoreResult<Option<Role>> {
    Ok(conn.query_row("SELECT role FROM user WHERE id = ?1", params![id], |r| r.get(0)).optional()?)
}

pub fn list_doctors(conn: &Connection) -> StoreResult<Vec<Doctor>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY d.id", SELECT))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_doctor(conn: &Connection, id: i64) -> StoreResult<Doctor> {
    conn.query_row(&format!("{} WHERE d.id = ?1", SELECT), params![id], from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound("doctor not found".into()))
}

/// Attach a doctor profile to an existing user holding the doctor role.
pub fn create_doctor(conn: &Connection, id: i64, profile: &DoctorProfile) -> StoreResult<Doctor> {
    match user_role(conn, id)? {
        Some(Role::Doctor) => {}
        Some(other) => return Err(StoreError::Invalid(format!("user {} has role {}, expected doctor", id, other))),
        None => return Err(StoreError::Invalid(format!("user {} does not exist", id))),
    }
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM doctor WHERE id = ?1)", params![id], |r| r.get(0))?;
    if exists {
        return Err(StoreError::Invalid(format!("doctor {} already exists", id)));
    }
    conn.execute(
        "INSERT INTO doctor (id, firstName, lastName, speciality) VALUES (?1, ?2, ?3, ?4)",
        params![id, profile.first_name, profile.last_name, profile.speciality],
    )?;
    get_doctor(conn, id)
}

pub fn update_doctor(conn: &Connection, id: i64, profile: &DoctorProfile) -> StoreResult<Doctor> {
    let n = conn.execute(
        "UPDATE doctor SET firstName = ?1, lastName = ?2, speciality = ?3 WHERE id = ?4",
        params![profile.first_name, profile.last_name, profile.speciality, id],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("doctor not found".into()));
    }
    get_doctor(conn, id)
}

/// Remove the doctor profile (and, by cascade, its appointments). The user row stays.
pub fn delete_doctor(conn: &Connection, id: i64) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM doctor WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound("doctor not found".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{schema, users};

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        schema::install(&c).unwrap();
        c
    }

    fn profile(first: &str) -> DoctorProfile {
        DoctorProfile { first_name: first.into(), last_name: "House".into(), speciality: "diagnostics".into() }
    }

    #[test]
    fn profile_requires_doctor_user() {
        let c = conn();
        let p = users::create_user_hashed(&c, "p@clinic.test", "h", Role::Patient).unwrap();
        assert!(matches!(create_doctor(&c, p.id, &profile("Greg")), Err(StoreError::Invalid(_))));
        assert!(matches!(create_doctor(&c, 404, &profile("Greg")), Err(StoreError::Invalid(_))));

        let d = users::create_user_hashed(&c, "d@clinic.test", "h", Role::Doctor).unwrap();
        let doc = create_doctor(&c, d.id, &profile("Greg")).unwrap();
        assert_eq!(doc.email, "d@clinic.test");
        assert!(matches!(create_doctor(&c, d.id, &profile("Greg")), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn update_delete_and_cascade() {
        let c = conn();
        let d = users::create_user_hashed(&c, "d@clinic.test", "h", Role::Doctor).unwrap();
        create_doctor(&c, d.id, &profile("Greg")).unwrap();
        let up = update_doctor(&c, d.id, &profile("Gregory")).unwrap();
        assert_eq!(up.first_name, "Gregory");
        assert_eq!(list_doctors(&c).unwrap().len(), 1);

        users::delete_user(&c, d.id).unwrap();
        assert!(list_doctors(&c).unwrap().is_empty());
        assert!(matches!(delete_doctor(&c, d.id), Err(StoreError::NotFound(_))));
        assert!(matches!(update_doctor(&c, d.id, &profile("x")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn json_uses_client_field_names() {
        let doc = Doctor { id: 1, first_name: "A".into(), last_name: "B".into(), speciality: "C".into(), email: "e@x.y".into() };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["firstName"], "A");
        assert_eq!(v["lastName"], "B");
        assert_eq!(v["speciality"], "C");
    }
}
