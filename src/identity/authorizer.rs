use tracing::debug;

use super::principal::{Principal, Role};
use crate::error::{AppError, AppResult};
use crate::storage::appointments::AppointmentFilter;
use crate::storage::medications::MedicationFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    User,
    Doctor,
    Patient,
    Medication,
    Appointment,
    PatientMedication,
    Accompaniment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Crud(Resource, Action),
    MyAppointments,
    MyPatients,
    MyMedications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Allowed, but only over rows owned by or associated with the caller.
    AllowedScopedToSelf,
    Denied,
}

/// The static (operation, role) policy. Every pair is listed; anything not granted is denied.
pub fn decide(op: Operation, role: Role) -> Decision {
    use Action::*;
    use Decision::*;
    use Operation::*;
    use Resource::*;

    match role {
        Role::Admin => match op {
            Crud(_, _) => Allowed,
            // Admins own no clinical rows
            MyAppointments | MyPatients | MyMedications => Denied,
        },
        Role::Doctor => match op {
            Crud(Medication, List | Get) => Allowed,
            Crud(Appointment, List) | Crud(Patient, List) => AllowedScopedToSelf,
            MyAppointments | MyPatients => AllowedScopedToSelf,
            Crud(_, _) | MyMedications => Denied,
        },
        Role::Patient => match op {
            Crud(Appointment, List) | Crud(Medication, List) => AllowedScopedToSelf,
            MyAppointments | MyMedications => AllowedScopedToSelf,
            Crud(_, _) | MyPatients => Denied,
        },
        Role::Accompanist => match op {
            Crud(Patient, List) | MyPatients => AllowedScopedToSelf,
            Crud(_, _) | MyAppointments | MyMedications => Denied,
        },
    }
}

/// Gate an operation for `principal`. Denied resolves to `Forbidden` before any data access.
pub fn authorize(principal: &Principal, op: Operation) -> AppResult<Decision> {
    let d = decide(op, principal.role);
    debug!(user_id = principal.user_id, role = %principal.role, ?op, ?d, "authorize");
    match d {
        Decision::Denied => Err(AppError::forbidden()),
        other => Ok(other),
    }
}

/// Which patient rows a caller may read, before the accompaniment lookup is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientScope {
    All,
    SeenByDoctor(i64),
    AccompaniedBy(i64),
}

fn scope_err(principal: &Principal) -> AppError {
    debug!(user_id = principal.user_id, role = %principal.role, "no self scope for role");
    AppError::forbidden()
}

pub fn appointment_filter(principal: &Principal, d: Decision) -> AppResult<AppointmentFilter> {
    match (d, principal.role) {
        (Decision::Allowed, _) => Ok(AppointmentFilter::All),
        (Decision::AllowedScopedToSelf, Role::Doctor) => Ok(AppointmentFilter::ForDoctor(principal.user_id)),
        (Decision::AllowedScopedToSelf, Role::Patient) => Ok(AppointmentFilter::ForPatient(principal.user_id)),
        _ => Err(scope_err(principal)),
    }
}

pub fn patient_scope(principal: &Principal, d: Decision) -> AppResult<PatientScope> {
    match (d, principal.role) {
        (Decision::Allowed, _) => Ok(PatientScope::All),
        (Decision::AllowedScopedToSelf, Role::Doctor) => Ok(PatientScope::SeenByDoctor(principal.user_id)),
        (Decision::AllowedScopedToSelf, Role::Accompanist) => Ok(PatientScope::AccompaniedBy(principal.user_id)),
        _ => Err(scope_err(principal)),
    }
}

pub fn medication_filter(principal: &Principal, d: Decision) -> AppResult<MedicationFilter> {
    match (d, principal.role) {
        (Decision::Allowed, _) => Ok(MedicationFilter::All),
        (Decision::AllowedScopedToSelf, Role::Patient) => Ok(MedicationFilter::PrescribedTo(principal.user_id)),
        _ => Err(scope_err(principal)),
    }
}
