//! Appointment handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_body, AppState, IdPath};
use crate::error::AppResult;
use crate::identity::{appointment_filter, authorize, Action, Operation, RequestContext, Resource};
use crate::storage::appointments::{self, Appointment, AppointmentFields};

fn op(a: Action) -> Operation {
    Operation::Crud(Resource::Appointment, a)
}

/// Every appointment for admins; doctors and patients see only the ones they take part in.
pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Appointment>>> {
    let d = authorize(&ctx.principal, op(Action::List))?;
    let filter = appointment_filter(&ctx.principal, d)?;
    Ok(Json(state.store.call(move |c| appointments::list_appointments(c, filter)).await?))
}

pub async fn get_one(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Appointment>> {
    authorize(&ctx.principal, op(Action::Get))?;
    let id = id.get()?;
    Ok(Json(state.store.call(move |c| appointments::get_appointment(c, id)).await?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    authorize(&ctx.principal, op(Action::Create))?;
    let f: AppointmentFields = parse_body(&body)?;
    let a = state.store.call(move |c| appointments::create_appointment(c, &f)).await?;
    info!(
        target: "api",
        request_id = %ctx.request_id,
        appointment_id = a.id,
        patient_id = a.patient_id,
        doctor_id = a.doctor_id,
        "appointment created"
    );
    Ok((StatusCode::CREATED, Json(a)))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<Json<Appointment>> {
    authorize(&ctx.principal, op(Action::Update))?;
    let id = id.get()?;
    let f: AppointmentFields = parse_body(&body)?;
    Ok(Json(state.store.call(move |c| appointments::update_appointment(c, id, &f)).await?))
}

pub async fn remove(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, op(Action::Delete))?;
    let id = id.get()?;
    state.store.call(move |c| appointments::delete_appointment(c, id)).await?;
    info!(target: "api", request_id = %ctx.request_id, appointment_id = id, "appointment deleted");
    Ok(Json(json!({ "message": "appointment deleted" })))
}
