//! Medication catalog handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_body, require_text, AppState, IdPath};
use crate::error::AppResult;
use crate::identity::{authorize, medication_filter, Action, Operation, RequestContext, Resource};
use crate::storage::medications::{self, Medication, MedicationFields};

fn op(a: Action) -> Operation {
    Operation::Crud(Resource::Medication, a)
}

/// Full catalog for admins and doctors, the caller's own prescriptions for patients.
pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Medication>>> {
    let d = authorize(&ctx.principal, op(Action::List))?;
    let filter = medication_filter(&ctx.principal, d)?;
    Ok(Json(state.store.call(move |c| medications::list_medications(c, filter)).await?))
}

pub async fn get_one(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Medication>> {
    authorize(&ctx.principal, op(Action::Get))?;
    let id = id.get()?;
    Ok(Json(state.store.call(move |c| medications::get_medication(c, id)).await?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Medication>)> {
    authorize(&ctx.principal, op(Action::Create))?;
    let f: MedicationFields = parse_body(&body)?;
    require_text(&f.name, "name")?;
    let m = state.store.call(move |c| medications::create_medication(c, &f)).await?;
    info!(target: "api", request_id = %ctx.request_id, medication_id = m.id, "medication created");
    Ok((StatusCode::CREATED, Json(m)))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<Json<Medication>> {
    authorize(&ctx.principal, op(Action::Update))?;
    let id = id.get()?;
    let f: MedicationFields = parse_body(&body)?;
    require_text(&f.name, "name")?;
    Ok(Json(state.store.call(move |c| medications::update_medication(c, id, &f)).await?))
}

pub async fn remove(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, op(Action::Delete))?;
    let id = id.get()?;
    state.store.call(move |c| medications::delete_medication(c, id)).await?;
    info!(target: "api", request_id = %ctx.request_id, medication_id = id, "medication deleted");
    Ok(Json(json!({ "message": "medication deleted" })))
}
