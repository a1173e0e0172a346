use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::principal::Principal;
use super::session::SessionManager;
use crate::error::{AppError, AppResult};
use crate::security::{hash_password, verify_password};
use crate::storage::users::{self, PublicUser, UserCredentials};
use crate::storage::SharedStore;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Argon2 hash of a throwaway password, verified against when the email is unknown so both
/// rejection paths cost one full verification.
static DUMMY_PHC: Lazy<String> = Lazy::new(|| hash_password("clinic-unknown-user").unwrap_or_default());

/// Match `password` against the stored row, running `verify` exactly once either way.
fn check_credentials<F>(cred: Option<UserCredentials>, password: &str, verify: F) -> Option<PublicUser>
where
    F: Fn(&str, &str) -> bool,
{
    match cred {
        Some(c) => verify(&c.password_hash, password).then(|| PublicUser { id: c.id, email: c.email, role: c.role }),
        None => {
            verify(DUMMY_PHC.as_str(), password);
            None
        }
    }
}

/// Credential check against the local user table, followed by token issuance.
pub struct LocalAuthProvider<'a> {
    pub store: &'a SharedStore,
    pub sm: &'a SessionManager,
}

impl<'a> LocalAuthProvider<'a> {
    pub fn new(store: &'a SharedStore, sm: &'a SessionManager) -> Self {
        Self { store, sm }
    }

    /// Unknown email and wrong password fail identically with `InvalidCredentials`.
    pub async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        if req.email.is_empty() || req.password.is_empty() {
            return Err(AppError::invalid_credentials());
        }
        let email = req.email.clone();
        let password = req.password.clone();
        // Argon2 verification is CPU-bound, so it runs with the lookup on the blocking pool
        let found = self
            .store
            .call(move |conn| {
                let cred = users::find_credentials_by_email(conn, &email)?;
                Ok(check_credentials(cred, &password, verify_password))
            })
            .await?;
        let Some(user) = found else {
            warn!(target: "auth", "login rejected");
            return Err(AppError::invalid_credentials());
        };
        let session = self.sm.issue(Principal { user_id: user.id, role: user.role })?;
        info!(target: "auth", user_id = user.id, role = %user.role, "login");
        Ok(LoginResponse { token: session.token, user })
    }
}
