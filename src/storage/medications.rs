use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{is_foreign_key_violation, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub details: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicationFields {
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedicationFilter {
    All,
    /// Only medications linked to this patient through patient_medication.
    PrescribedTo(i64),
}

const COLUMNS: &str = "m.id, m.name, m.dosage, m.frequency, m.details, m.instructions";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: r.get(0)?,
        name: r.get(1)?,
        dosage: r.get(2)?,
        frequency: r.get(3)?,
        details: r.get(4)?,
        instructions: r.get(5)?,
    })
}

pub fn list_medications(conn: &Connection, filter: MedicationFilter) -> StoreResult<Vec<Medication>> {
    let rows = match filter {
        MedicationFilter::All => {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM medicament m ORDER BY m.id", COLUMNS))?;
            let rows = stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        MedicationFilter::PrescribedTo(patient_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM medicament m JOIN patient_medication pm ON m.id = pm.medication_id \
                 WHERE pm.patient_id = ?1 ORDER BY m.id",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![patient_id], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn get_medication(conn: &Connection, id: i64) -> StoreResult<Medication> {
    conn.query_row(&format!("SELECT {} FROM medicament m WHERE m.id = ?1", COLUMNS), params![id], from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound("medication not found".into()))
}

pub fn create_medication(conn: &Connection, f: &MedicationFields) -> StoreResult<Medication> {
    conn.execute(
        "INSERT INTO medicament (name, dosage, frequency, details, instructions) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![f.name, f.dosage, f.frequency, f.details, f.instructions],
    )?;
    get_medication(conn, conn.last_insert_rowid())
}

pub fn update_medication(conn: &Connection, id: i64, f: &MedicationFields) -> StoreResult<Medication> {
    let n = conn.execute(
        "UPDATE medicament SET name = ?1, dosage = ?2, frequency = ?3, details = ?4, instructions = ?5 WHERE id = ?6",
        params![f.name, f.dosage, f.frequency, f.details, f.instructions, id],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("medication not found".into()));
    }
    get_medication(conn, id)
}

pub fn delete_medication(conn: &Connection, id: i64) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM medicament WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound("medication not found".into()));
    }
    Ok(())
}

/// Link a medication to a patient. Linking twice is a no-op.
pub fn link_medication(conn: &Connection, patient_id: i64, medication_id: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO patient_medication (patient_id, medication_id) VALUES (?1, ?2)",
        params![patient_id, medication_id],
    )
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            StoreError::Invalid(format!("unknown patient {} or medication {}", patient_id, medication_id))
        } else {
            StoreError::Sqlite(e)
        }
    })?;
    Ok(())
}

pub fn unlink_medication(conn: &Connection, patient_id: i64, medication_id: i64) -> StoreResult<()> {
    let n = conn.execute(
        "DELETE FROM patient_medication WHERE patient_id = ?1 AND medication_id = ?2",
        params![patient_id, medication_id],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("medication link not found".into()));
    }
    Ok(())
}
