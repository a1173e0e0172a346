//!
//! clinic HTTP server
//! ------------------
//! This module defines the Axum-based HTTP/JSON API for the clinic.
//!
//! Responsibilities:
//! - Login endpoint issuing signed bearer tokens (`POST /api/auth`).
//! - Bearer verification on every other `/api` route via the `RequestContext` extractor.
//! - The authorization gate: each handler resolves its `Operation` against the matrix
//!   before it touches the store, and scoped reads bind the caller's id into the filter.
//! - Admin CRUD over users, doctors, patients, medications, appointments and links.
//! - Startup: config, store, optional bootstrap administrator, listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{FromRef, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{LocalAuthProvider, LoginRequest, LoginResponse, Principal, RequestContext, SessionManager};
use crate::storage::accompaniments::{AccompanimentDirectory, SqlAccompaniments};
use crate::storage::SharedStore;

pub mod users;
pub mod people;
pub mod catalog;
pub mod appointments;
pub mod scoped;

/// Shared server state injected into all handlers.
///
/// Holds the store handle, the immutable session manager (signing secret and TTL) and
/// the accompaniment lookup. Nothing here is mutated while serving requests.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: Arc<SessionManager>,
    pub accompaniments: Arc<dyn AccompanimentDirectory>,
}

impl AppState {
    pub fn new(store: SharedStore, sessions: SessionManager) -> Self {
        Self { store, sessions: Arc::new(sessions), accompaniments: Arc::new(SqlAccompaniments) }
    }

    /// Replace the accompaniment lookup, e.g. with one backed by an external registry.
    pub fn with_accompaniments(mut self, dir: Arc<dyn AccompanimentDirectory>) -> Self {
        self.accompaniments = dir;
        self
    }
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Decode a JSON body after the authorization gate has passed.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    if body.is_empty() {
        return Err(AppError::validation("missing data"));
    }
    serde_json::from_slice::<T>(body).map_err(|e| AppError::validation(format!("invalid data: {}", e)))
}

/// Path parameters whose decoding failure is held back until the handler has run the
/// authorization gate. `get` turns a bad id into `ValidationFailed`.
#[derive(Debug)]
pub struct IdPath<T>(AppResult<T>);

impl<T> IdPath<T> {
    pub fn get(self) -> AppResult<T> {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for IdPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(IdPath(
            Path::<T>::from_request_parts(parts, state)
                .await
                .map(|Path(v)| v)
                .map_err(|rej| AppError::validation(format!("invalid id: {}", rej.body_text()))),
        ))
    }
}

pub(crate) fn require_text(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("missing data: {}", field)));
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "clinic ok" }))
        .route("/api/auth", post(login))
        .route("/api/me", get(me))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/{id}", get(users::get_one).put(users::update).delete(users::remove))
        .route("/api/doctors", get(people::list_doctors).post(people::create_doctor))
        .route(
            "/api/doctors/{id}",
            get(people::get_doctor).put(people::update_doctor).delete(people::delete_doctor),
        )
        .route("/api/patients", get(people::list_patients).post(people::create_patient))
        .route(
            "/api/patients/{id}",
            get(people::get_patient).put(people::update_patient).delete(people::delete_patient),
        )
        .route(
            "/api/patients/{id}/medicaments",
            get(people::patient_medications).post(people::link_medication),
        )
        .route("/api/patients/{id}/medicaments/{medication_id}", delete(people::unlink_medication))
        .route("/api/accompaniments", post(people::add_accompaniment))
        .route("/api/accompaniments/{accompanist_id}/{patient_id}", delete(people::remove_accompaniment))
        .route("/api/medicaments", get(catalog::list).post(catalog::create))
        .route("/api/medicaments/{id}", get(catalog::get_one).put(catalog::update).delete(catalog::remove))
        .route("/api/appointments", get(appointments::list).post(appointments::create))
        .route(
            "/api/appointments/{id}",
            get(appointments::get_one).put(appointments::update).delete(appointments::remove),
        )
        .route("/api/my-appointments", get(scoped::my_appointments))
        .route("/api/my-patients", get(scoped::my_patients))
        .route("/api/accompanied-patients", get(scoped::my_patients))
        .route("/api/my-medicaments", get(scoped::my_medications))
        .with_state(state)
}

async fn login(State(state): State<AppState>, body: Bytes) -> AppResult<Json<LoginResponse>> {
    let req: LoginRequest = serde_json::from_slice(&body).map_err(|_| AppError::invalid_credentials())?;
    let resp = LocalAuthProvider::new(&state.store, &state.sessions).login(&req).await?;
    Ok(Json(resp))
}

async fn me(ctx: RequestContext) -> Json<Principal> {
    Json(ctx.principal)
}

/// Serve `state` on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    let store = SharedStore::open(&cfg.db_path, cfg.store_timeout)
        .with_context(|| format!("While opening clinic store at {}", cfg.db_path))?;
    if let Some((email, password)) = &cfg.bootstrap_admin {
        crate::storage::ensure_default_admin(&store, email, password)
            .with_context(|| format!("While ensuring bootstrap administrator {}", email))?;
    }
    let state = AppState::new(store, SessionManager::new(cfg.token_secret.clone(), cfg.token_ttl));

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("While binding {}", addr))?;
    info!("Starting server on {}", addr);
    serve(listener, state).await
}

/// Entry point reading configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        #[allow(dead_code)]
        name: String,
    }

    #[test]
    fn parse_body_maps_to_validation() {
        assert!(matches!(parse_body::<Probe>(&Bytes::new()), Err(AppError::ValidationFailed { .. })));
        assert!(matches!(parse_body::<Probe>(&Bytes::from_static(b"{}")), Err(AppError::ValidationFailed { .. })));
        assert!(matches!(parse_body::<Probe>(&Bytes::from_static(b"not json")), Err(AppError::ValidationFailed { .. })));
        assert!(parse_body::<Probe>(&Bytes::from_static(br#"{"name":"x"}"#)).is_ok());
    }

    #[test]
    fn require_text_rejects_blank() {
        assert!(require_text("  ", "email").is_err());
        assert!(require_text("a", "email").is_ok());
    }
}
