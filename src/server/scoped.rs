//! Caller-scoped reads. The caller's id comes from the verified token, never from the request.

use axum::extract::State;
use axum::Json;

use super::people::scoped_patients;
use super::AppState;
use crate::error::AppResult;
use crate::identity::{appointment_filter, authorize, medication_filter, patient_scope, Operation, RequestContext};
use crate::storage::appointments::{self, Appointment};
use crate::storage::medications::{self, Medication};
use crate::storage::patients::Patient;

pub async fn my_appointments(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Appointment>>> {
    let d = authorize(&ctx.principal, Operation::MyAppointments)?;
    let filter = appointment_filter(&ctx.principal, d)?;
    Ok(Json(state.store.call(move |c| appointments::list_appointments(c, filter)).await?))
}

/// Doctors get the patients they have appointments with, accompanists the patients they accompany.
pub async fn my_patients(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Patient>>> {
    let d = authorize(&ctx.principal, Operation::MyPatients)?;
    let scope = patient_scope(&ctx.principal, d)?;
    Ok(Json(scoped_patients(&state, scope).await?))
}

pub async fn my_medications(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Medication>>> {
    let d = authorize(&ctx.principal, Operation::MyMedications)?;
    let filter = medication_filter(&ctx.principal, d)?;
    Ok(Json(state.store.call(move |c| medications::list_medications(c, filter)).await?))
}
