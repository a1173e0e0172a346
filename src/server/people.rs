//! Doctor and patient profiles, patient medication links and accompaniments.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_body, require_text, AppState, IdPath};
use crate::error::AppResult;
use crate::identity::{authorize, patient_scope, Action, Operation, PatientScope, RequestContext, Resource};
use crate::storage::medications::{self, Medication, MedicationFilter};
use crate::storage::patients::{self, Patient, PatientFilter, PatientProfile};
use crate::storage::{accompaniments, doctors};
use crate::storage::doctors::{Doctor, DoctorProfile};

/// Profile creation body: the id of an existing user plus the profile fields.
#[derive(Debug, Deserialize)]
struct NewProfile<P> {
    id: i64,
    #[serde(flatten)]
    profile: P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkPayload {
    medication_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccompanimentPayload {
    accompanist_id: i64,
    patient_id: i64,
}

fn check_doctor(p: &DoctorProfile) -> AppResult<()> {
    require_text(&p.first_name, "firstName")?;
    require_text(&p.last_name, "lastName")
}

fn check_patient(p: &PatientProfile) -> AppResult<()> {
    require_text(&p.first_name, "firstName")?;
    require_text(&p.last_name, "lastName")
}

/// Run a patient read under `scope`, resolving accompaniments through the directory.
pub(crate) async fn scoped_patients(state: &AppState, scope: PatientScope) -> AppResult<Vec<Patient>> {
    let dir = state.accompaniments.clone();
    state
        .store
        .call(move |c| {
            let filter = match scope {
                PatientScope::All => PatientFilter::All,
                PatientScope::SeenByDoctor(id) => PatientFilter::SeenByDoctor(id),
                PatientScope::AccompaniedBy(id) => PatientFilter::Ids(dir.patient_ids(c, id)?),
            };
            patients::list_patients(c, &filter)
        })
        .await
}

// --- doctors ---

pub async fn list_doctors(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Doctor>>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Doctor, Action::List))?;
    Ok(Json(state.store.call(|c| doctors::list_doctors(c)).await?))
}

pub async fn get_doctor(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Doctor>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Doctor, Action::Get))?;
    let id = id.get()?;
    Ok(Json(state.store.call(move |c| doctors::get_doctor(c, id)).await?))
}

pub async fn create_doctor(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Doctor>)> {
    authorize(&ctx.principal, Operation::Crud(Resource::Doctor, Action::Create))?;
    let new: NewProfile<DoctorProfile> = parse_body(&body)?;
    check_doctor(&new.profile)?;
    let doc = state.store.call(move |c| doctors::create_doctor(c, new.id, &new.profile)).await?;
    info!(target: "api", request_id = %ctx.request_id, doctor_id = doc.id, "doctor created");
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<Json<Doctor>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Doctor, Action::Update))?;
    let id = id.get()?;
    let profile: DoctorProfile = parse_body(&body)?;
    check_doctor(&profile)?;
    Ok(Json(state.store.call(move |c| doctors::update_doctor(c, id, &profile)).await?))
}

pub async fn delete_doctor(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Doctor, Action::Delete))?;
    let id = id.get()?;
    state.store.call(move |c| doctors::delete_doctor(c, id)).await?;
    info!(target: "api", request_id = %ctx.request_id, doctor_id = id, "doctor deleted");
    Ok(Json(json!({ "message": "doctor deleted" })))
}

// --- patients ---

/// All patients for admins; a doctor's own patients; an accompanist's accompanied patients.
pub async fn list_patients(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<Patient>>> {
    let d = authorize(&ctx.principal, Operation::Crud(Resource::Patient, Action::List))?;
    let scope = patient_scope(&ctx.principal, d)?;
    Ok(Json(scoped_patients(&state, scope).await?))
}

pub async fn get_patient(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Patient>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Patient, Action::Get))?;
    let id = id.get()?;
    Ok(Json(state.store.call(move |c| patients::get_patient(c, id)).await?))
}

pub async fn create_patient(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Patient>)> {
    authorize(&ctx.principal, Operation::Crud(Resource::Patient, Action::Create))?;
    let new: NewProfile<PatientProfile> = parse_body(&body)?;
    check_patient(&new.profile)?;
    let p = state.store.call(move |c| patients::create_patient(c, new.id, &new.profile)).await?;
    info!(target: "api", request_id = %ctx.request_id, patient_id = p.id, "patient created");
    Ok((StatusCode::CREATED, Json(p)))
}

pub async fn update_patient(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<Json<Patient>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Patient, Action::Update))?;
    let id = id.get()?;
    let profile: PatientProfile = parse_body(&body)?;
    check_patient(&profile)?;
    Ok(Json(state.store.call(move |c| patients::update_patient(c, id, &profile)).await?))
}

pub async fn delete_patient(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Patient, Action::Delete))?;
    let id = id.get()?;
    state.store.call(move |c| patients::delete_patient(c, id)).await?;
    info!(target: "api", request_id = %ctx.request_id, patient_id = id, "patient deleted");
    Ok(Json(json!({ "message": "patient deleted" })))
}

// --- patient medication links ---

pub async fn patient_medications(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
) -> AppResult<Json<Vec<Medication>>> {
    authorize(&ctx.principal, Operation::Crud(Resource::PatientMedication, Action::List))?;
    let id = id.get()?;
    let meds = state
        .store
        .call(move |c| {
            patients::get_patient(c, id)?;
            medications::list_medications(c, MedicationFilter::PrescribedTo(id))
        })
        .await?;
    Ok(Json(meds))
}

pub async fn link_medication(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    authorize(&ctx.principal, Operation::Crud(Resource::PatientMedication, Action::Create))?;
    let id = id.get()?;
    let link: LinkPayload = parse_body(&body)?;
    let medication_id = link.medication_id;
    state.store.call(move |c| medications::link_medication(c, id, medication_id)).await?;
    info!(target: "api", request_id = %ctx.request_id, patient_id = id, medication_id, "medication linked");
    Ok((StatusCode::CREATED, Json(json!({ "patient_id": id, "medication_id": medication_id }))))
}

pub async fn unlink_medication(
    State(state): State<AppState>,
    ctx: RequestContext,
    ids: IdPath<(i64, i64)>,
) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, Operation::Crud(Resource::PatientMedication, Action::Delete))?;
    let (id, medication_id) = ids.get()?;
    state.store.call(move |c| medications::unlink_medication(c, id, medication_id)).await?;
    Ok(Json(json!({ "message": "medication unlinked" })))
}

// --- accompaniments ---

pub async fn add_accompaniment(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    authorize(&ctx.principal, Operation::Crud(Resource::Accompaniment, Action::Create))?;
    let p: AccompanimentPayload = parse_body(&body)?;
    let (acc, pat) = (p.accompanist_id, p.patient_id);
    state.store.call(move |c| accompaniments::add_accompaniment(c, acc, pat)).await?;
    info!(target: "api", request_id = %ctx.request_id, accompanist_id = acc, patient_id = pat, "accompaniment added");
    Ok((StatusCode::CREATED, Json(json!({ "accompanistId": acc, "patientId": pat }))))
}

pub async fn remove_accompaniment(
    State(state): State<AppState>,
    ctx: RequestContext,
    ids: IdPath<(i64, i64)>,
) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, Operation::Crud(Resource::Accompaniment, Action::Delete))?;
    let (acc, pat) = ids.get()?;
    state.store.call(move |c| accompaniments::remove_accompaniment(c, acc, pat)).await?;
    Ok(Json(json!({ "message": "accompaniment removed" })))
}
