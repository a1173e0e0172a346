//! Accompanist to patient relationship.
//!
//! Reads go through `AccompanimentDirectory`, so the relationship can live outside
//! this database. `SqlAccompaniments` is the default and reads the local
//! `accompaniment` table, which administrators maintain with `add_accompaniment`
//! and `remove_accompaniment`.

use rusqlite::{params, Connection};

use super::doctors::user_role;
use super::{StoreError, StoreResult};
use crate::identity::Role;

pub trait AccompanimentDirectory: Send + Sync {
    /// Patient ids accompanied by `accompanist_id`. Unknown accompanists yield an empty set.
    fn patient_ids(&self, conn: &Connection, accompanist_id: i64) -> StoreResult<Vec<i64>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlAccompaniments;

impl AccompanimentDirectory for SqlAccompaniments {
    fn patient_ids(&self, conn: &Connection, accompanist_id: i64) -> StoreResult<Vec<i64>> {
        let mut stmt = conn.prepare("SELECT patient_id FROM accompaniment WHERE accompanist_id = ?1 ORDER BY patient_id")?;
        let ids = stmt.query_map(params![accompanist_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}

pub fn add_accompaniment(conn: &Connection, accompanist_id: i64, patient_id: i64) -> StoreResult<()> {
    match user_role(conn, accompanist_id)? {
        Some(Role::Accompanist) => {}
        Some(other) => {
            return Err(StoreError::Invalid(format!("user {} has role {}, expected accompanist", accompanist_id, other)))
        }
        None => return Err(StoreError::Invalid(format!("user {} does not exist", accompanist_id))),
    }
    let patient: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM patient WHERE id = ?1)", params![patient_id], |r| r.get(0))?;
    if !patient {
        return Err(StoreError::Invalid(format!("patient {} does not exist", patient_id)));
    }
    conn.execute(
        "INSERT OR IGNORE INTO accompaniment (accompanist_id, patient_id) VALUES (?1, ?2)",
        params![accompanist_id, patient_id],
    )?;
    Ok(())
}

pub fn remove_accompaniment(conn: &Connection, accompanist_id: i64, patient_id: i64) -> StoreResult<()> {
    let n = conn.execute(
        "DELETE FROM accompaniment WHERE accompanist_id = ?1 AND patient_id = ?2",
        params![accompanist_id, patient_id],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("accompaniment not found".into()));
    }
    Ok(())
}
