//! Signed, time-limited session tokens.
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(secret, first_part))`.
//! Nothing is kept server-side: verification needs only the signing secret, so a
//! token stays valid until `expiresAt` and there is no refresh or revocation.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::principal::{Principal, Role};
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub type SessionToken = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Claims {
    pub user_id: i64,
    pub role: Role,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub claims: Claims,
}

pub struct SessionManager {
    secret: Vec<u8>,
    pub ttl: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SessionManager {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self { secret: secret.into(), ttl }
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::invalid_token(format!("signing key rejected: {}", e)))
    }

    pub fn issue(&self, principal: Principal) -> AppResult<Session> {
        self.issue_at(principal, now_secs())
    }

    /// Mint a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, principal: Principal, now: i64) -> AppResult<Session> {
        let claims = Claims {
            user_id: principal.user_id,
            role: principal.role,
            issued_at: now,
            expires_at: now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|e| AppError::store_unavailable(format!("token encoding failed: {}", e)))?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        debug!(user_id = principal.user_id, role = %principal.role, ttl_secs = self.ttl.as_secs(), "session.issue");
        Ok(Session { token: format!("{}.{}", body, sig), claims })
    }

    pub fn validate(&self, token: &str) -> AppResult<Principal> {
        self.validate_at(token, now_secs())
    }

    /// Verify signature and expiry against `now`. Valid strictly before `expiresAt`.
    pub fn validate_at(&self, token: &str, now: i64) -> AppResult<Principal> {
        let claims = self.decode(token)?;
        if now >= claims.expires_at {
            return Err(AppError::invalid_token("token expired"));
        }
        Ok(Principal { user_id: claims.user_id, role: claims.role })
    }

    fn decode(&self, token: &str) -> AppResult<Claims> {
        let Some((body, sig)) = token.split_once('.') else {
            return Err(AppError::invalid_token("malformed token"));
        };
        let provided = URL_SAFE_NO_PAD.decode(sig).map_err(|_| AppError::invalid_token("malformed token"))?;
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let expected = mac.finalize().into_bytes();
        if provided.len() != expected.len() || !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(AppError::invalid_token("invalid token signature"));
        }
        let json = URL_SAFE_NO_PAD.decode(body).map_err(|_| AppError::invalid_token("malformed token"))?;
        serde_json::from_slice::<Claims>(&json).map_err(|_| AppError::invalid_token("malformed token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm() -> SessionManager {
        SessionManager::new(vec![0xABu8; 32], Duration::from_secs(24 * 60 * 60))
    }

    const DOCTOR: Principal = Principal { user_id: 7, role: Role::Doctor };

    #[test]
    fn issued_token_carries_identity() {
        let s = sm().issue_at(DOCTOR, 1_000).unwrap();
        assert_eq!(s.claims.issued_at, 1_000);
        assert_eq!(s.claims.expires_at, 1_000 + 86_400);
        assert_eq!(sm().validate_at(&s.token, 1_001).unwrap(), DOCTOR);
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let s = sm().issue_at(DOCTOR, 1_000).unwrap();
        assert!(sm().validate_at(&s.token, 1_000 + 86_399).is_ok());
        let err = sm().validate_at(&s.token, 1_000 + 86_400).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken { .. }));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_wrapping() {
        let huge = SessionManager::new(vec![0xABu8; 32], Duration::from_secs(u64::MAX));
        let s = huge.issue_at(DOCTOR, 1_000).unwrap();
        assert_eq!(s.claims.expires_at, i64::MAX);
        assert_eq!(huge.validate_at(&s.token, 1_001).unwrap(), DOCTOR);
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let s = sm().issue_at(DOCTOR, 1_000).unwrap();
        let (_, sig) = s.token.split_once('.').unwrap();
        let forged = Claims { user_id: 7, role: Role::Admin, issued_at: 1_000, expires_at: 90_000 };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let err = sm().validate_at(&format!("{}.{}", body, sig), 1_001).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken { .. }));
    }

    #[test]
    fn other_secret_is_rejected() {
        let s = sm().issue_at(DOCTOR, 1_000).unwrap();
        let other = SessionManager::new(vec![0xCDu8; 32], Duration::from_secs(60));
        assert!(other.validate_at(&s.token, 1_001).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        for t in ["", "abc", "abc.def", "a.b.c", "!!!.???"] {
            assert!(matches!(sm().validate_at(t, 0), Err(AppError::InvalidToken { .. })), "{}", t);
        }
    }
}
