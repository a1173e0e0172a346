//! Identity, sessions and authorization for the clinic API.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod request_context;
mod authorizer;

pub use principal::{Principal, Role};
pub use session::{Claims, Session, SessionToken, SessionManager};
pub use provider::{LocalAuthProvider, LoginRequest, LoginResponse};
pub use request_context::{bearer_token, RequestContext};
pub use authorizer::{
    appointment_filter, authorize, decide, medication_filter, patient_scope, Action, Decision, Operation, PatientScope,
    Resource,
};
