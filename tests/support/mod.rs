//! Shared harness for the HTTP tests: an in-memory clinic on an ephemeral port plus seed helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use clinic::identity::{Principal, Role, SessionManager};
use clinic::security::hash_password;
use clinic::server::{serve, AppState};
use clinic::storage::appointments::{self, AppointmentFields};
use clinic::storage::doctors::{self, DoctorProfile};
use clinic::storage::medications::{self, MedicationFields};
use clinic::storage::patients::{self, PatientProfile};
use clinic::storage::{users, SharedStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SECRET: &[u8] = b"clinic-test-secret-0123456789abcdef";

pub struct TestServer {
    pub base: String,
    pub store: SharedStore,
    pub sessions: Arc<SessionManager>,
    pub client: reqwest::Client,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn token_for(&self, user_id: i64, role: Role) -> String {
        self.sessions.issue(Principal { user_id, role }).unwrap().token
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, token: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.post(self.url(path)).bearer_auth(token).json(&body).send().await.unwrap()
    }

    pub async fn put(&self, path: &str, token: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.put(self.url(path)).bearer_auth(token).json(&body).send().await.unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).bearer_auth(token).send().await.unwrap()
    }
}

pub async fn start() -> TestServer {
    start_with(|s| s).await
}

/// Start a server over a fresh in-memory store, letting the caller adjust the state first.
pub async fn start_with(adjust: impl FnOnce(AppState) -> AppState) -> TestServer {
    let store = SharedStore::open_in_memory(Duration::from_secs(5)).unwrap();
    let state = adjust(AppState::new(store.clone(), SessionManager::new(SECRET, Duration::from_secs(3600))));
    let sessions = state.sessions.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(serve(listener, state));
    TestServer { base: format!("http://{}", addr), store, sessions, client: reqwest::Client::new(), task }
}

/// Insert a user with a real Argon2 hash so it can log in.
pub fn seed_login(store: &SharedStore, email: &str, password: &str, role: Role) -> i64 {
    let phc = hash_password(password).unwrap();
    store.with_conn(|c| users::create_user_hashed(c, email, &phc, role)).unwrap().id
}

/// Insert a user that only ever authenticates through minted tokens.
pub fn seed_user(store: &SharedStore, email: &str, role: Role) -> i64 {
    store.with_conn(|c| users::create_user_hashed(c, email, "not-a-hash", role)).unwrap().id
}

pub fn seed_doctor(store: &SharedStore, email: &str, last_name: &str) -> i64 {
    let id = seed_user(store, email, Role::Doctor);
    let p = DoctorProfile { first_name: "Dr".into(), last_name: last_name.into(), speciality: "general".into() };
    store.with_conn(|c| doctors::create_doctor(c, id, &p)).unwrap();
    id
}

pub fn seed_patient(store: &SharedStore, email: &str, last_name: &str) -> i64 {
    let id = seed_user(store, email, Role::Patient);
    let p = PatientProfile { first_name: "Pat".into(), last_name: last_name.into(), phone_number: "0600000000".into() };
    store.with_conn(|c| patients::create_patient(c, id, &p)).unwrap();
    id
}

pub fn seed_medication(store: &SharedStore, name: &str) -> i64 {
    let f = MedicationFields { name: name.into(), dosage: "1 tablet".into(), ..Default::default() };
    store.with_conn(|c| medications::create_medication(c, &f)).unwrap().id
}

pub fn seed_appointment(store: &SharedStore, patient_id: i64, doctor_id: i64, at: &str) -> i64 {
    let f: AppointmentFields = serde_json::from_value(serde_json::json!({
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "date_time": at,
    }))
    .unwrap();
    store.with_conn(|c| appointments::create_appointment(c, &f)).unwrap().id
}

pub fn link(store: &SharedStore, patient_id: i64, medication_id: i64) {
    store.with_conn(|c| medications::link_medication(c, patient_id, medication_id)).unwrap();
}
