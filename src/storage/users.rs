use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{is_unique_violation, StoreError, StoreResult};
use crate::identity::Role;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("static email pattern"));

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse::<Role>().map_err(|e| FromSqlError::Other(e.into()))
    }
}

/// User projection that is safe to return to clients. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

/// Row used only by the login path.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub email: String,
    /// `None` keeps the current password.
    pub password: Option<String>,
    pub role: Role,
}

pub fn validate_email(email: &str) -> StoreResult<()> {
    if EMAIL_RE.is_match(email) { Ok(()) } else { Err(StoreError::Invalid(format!("invalid email: {}", email))) }
}

fn map_write_err(e: rusqlite::Error) -> StoreError {
    if is_unique_violation(&e) { StoreError::DuplicateEmail } else { StoreError::Sqlite(e) }
}

fn hash(password: &str) -> StoreResult<String> {
    crate::security::hash_password(password).map_err(|e| StoreError::Invalid(format!("password rejected: {}", e)))
}

pub fn count_users(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("SELECT COUNT(1) FROM user", [], |r| r.get(0))?)
}

pub fn list_users(conn: &Connection) -> StoreResult<Vec<PublicUser>> {
    let mut stmt = conn.prepare("SELECT id, email, role FROM user ORDER BY id")?;
    let rows = stmt.query_map([], |r| Ok(PublicUser { id: r.get(0)?, email: r.get(1)?, role: r.get(2)? }))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_user(conn: &Connection, id: i64) -> StoreResult<PublicUser> {
    conn.query_row("SELECT id, email, role FROM user WHERE id = ?1", params![id], |r| {
        Ok(PublicUser { id: r.get(0)?, email: r.get(1)?, role: r.get(2)? })
    })
    .optional()?
    .ok_or_else(|| StoreError::NotFound("user not found".into()))
}

pub fn find_credentials_by_email(conn: &Connection, email: &str) -> StoreResult<Option<UserCredentials>> {
    let row = conn
        .query_row("SELECT id, email, password, role FROM user WHERE email = ?1", params![email], |r| {
            Ok(UserCredentials { id: r.get(0)?, email: r.get(1)?, password_hash: r.get(2)?, role: r.get(3)? })
        })
        .optional()?;
    Ok(row)
}

pub fn create_user(conn: &Connection, new: &NewUser) -> StoreResult<PublicUser> {
    validate_email(&new.email)?;
    let phc = hash(&new.password)?;
    create_user_hashed(conn, &new.email, &phc, new.role)
}

/// Insert a user whose password is already an Argon2 PHC string.
pub fn create_user_hashed(conn: &Connection, email: &str, phc: &str, role: Role) -> StoreResult<PublicUser> {
    conn.execute("INSERT INTO user (email, password, role) VALUES (?1, ?2, ?3)", params![email, phc, role])
        .map_err(map_write_err)?;
    Ok(PublicUser { id: conn.last_insert_rowid(), email: email.to_string(), role })
}

fn has_profile(conn: &Connection, id: i64) -> StoreResult<Option<&'static str>> {
    let doctor: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM doctor WHERE id = ?1)", params![id], |r| r.get(0))?;
    if doctor { return Ok(Some("a doctor profile")); }
    let patient: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM patient WHERE id = ?1)", params![id], |r| r.get(0))?;
    if patient { return Ok(Some("a patient profile")); }
    let accompanies: bool =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM accompaniment WHERE accompanist_id = ?1)", params![id], |r| r.get(0))?;
    Ok(if accompanies { Some("accompaniments") } else { None })
}

pub fn update_user(conn: &Connection, id: i64, upd: &UserUpdate) -> StoreResult<PublicUser> {
    validate_email(&upd.email)?;
    let current = get_user(conn, id)?;
    if current.role != upd.role {
        if let Some(profile) = has_profile(conn, id)? {
            return Err(StoreError::Invalid(format!(
                "user {} has {}; remove it before changing role", id, profile
            )));
        }
    }
    let changed = match &upd.password {
        Some(pw) => {
            let phc = hash(pw)?;
            conn.execute(
                "UPDATE user SET email = ?1, password = ?2, role = ?3 WHERE id = ?4",
                params![upd.email, phc, upd.role, id],
            )
        }
        None => conn.execute("UPDATE user SET email = ?1, role = ?2 WHERE id = ?3", params![upd.email, upd.role, id]),
    }
    .map_err(map_write_err)?;
    if changed == 0 {
        return Err(StoreError::NotFound("user not found".into()));
    }
    Ok(PublicUser { id, email: upd.email.clone(), role: upd.role })
}

pub fn delete_user(conn: &Connection, id: i64) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM user WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound("user not found".into()));
    }
    Ok(())
}
