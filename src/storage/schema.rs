use rusqlite::Connection;

/// Tables, keys and cascades. Every person row (doctor, patient) shares its id with a user row.
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS user (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    email    TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password TEXT NOT NULL,
    role     TEXT NOT NULL CHECK (role IN ('admin', 'doctor', 'patient', 'accompanist'))
);

CREATE TABLE IF NOT EXISTS doctor (
    id         INTEGER PRIMARY KEY REFERENCES user(id) ON DELETE CASCADE,
    firstName  TEXT NOT NULL,
    lastName   TEXT NOT NULL,
    speciality TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS patient (
    id          INTEGER PRIMARY KEY REFERENCES user(id) ON DELETE CASCADE,
    firstName   TEXT NOT NULL,
    lastName    TEXT NOT NULL,
    phoneNumber TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS medicament (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    dosage       TEXT NOT NULL DEFAULT '',
    frequency    TEXT NOT NULL DEFAULT '',
    details      TEXT NOT NULL DEFAULT '',
    instructions TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS patient_medication (
    patient_id    INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE,
    medication_id INTEGER NOT NULL REFERENCES medicament(id) ON DELETE CASCADE,
    PRIMARY KEY (patient_id, medication_id)
);

CREATE TABLE IF NOT EXISTS appointment (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE,
    doctor_id  INTEGER NOT NULL REFERENCES doctor(id) ON DELETE CASCADE,
    date_time  TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'scheduled',
    notes      TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS appointment_doctor_idx ON appointment(doctor_id);
CREATE INDEX IF NOT EXISTS appointment_patient_idx ON appointment(patient_id);

CREATE TABLE IF NOT EXISTS accompaniment (
    accompanist_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    patient_id     INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE,
    PRIMARY KEY (accompanist_id, patient_id)
);
"#;

pub fn install(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.execute_batch(DDL)
}
