//! Environment-driven server configuration.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const MIN_SECRET_LEN: usize = 32;
/// Upper bound on `CLINIC_TOKEN_TTL_SECS` (366 days).
pub const MAX_TOKEN_TTL_SECS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub db_path: String,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub store_timeout: Duration,
    pub bootstrap_admin: Option<(String, String)>,
}

impl ServerConfig {
    /// Build a config with defaults around an explicit signing secret.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let token_secret = secret.into();
        if token_secret.len() < MIN_SECRET_LEN {
            return Err(anyhow!("token secret must be at least {} bytes", MIN_SECRET_LEN));
        }
        Ok(Self {
            http_port: 3001,
            db_path: "clinic.db".to_string(),
            token_secret,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            store_timeout: Duration::from_millis(5000),
            bootstrap_admin: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Resolve settings through `lookup`; `from_env` passes the process environment.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let secret = lookup("CLINIC_TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("CLINIC_TOKEN_SECRET must be set"))?;
        let mut cfg = Self::with_secret(secret.into_bytes())?;

        if let Some(p) = lookup("CLINIC_HTTP_PORT") {
            cfg.http_port = p.parse::<u16>().with_context(|| format!("invalid CLINIC_HTTP_PORT: {}", p))?;
        }
        if let Some(p) = lookup("CLINIC_DB_PATH") {
            cfg.db_path = p;
        }
        if let Some(s) = lookup("CLINIC_TOKEN_TTL_SECS") {
            let secs = s.parse::<u64>().with_context(|| format!("invalid CLINIC_TOKEN_TTL_SECS: {}", s))?;
            if secs == 0 { return Err(anyhow!("CLINIC_TOKEN_TTL_SECS must be positive")); }
            if secs > MAX_TOKEN_TTL_SECS {
                return Err(anyhow!("CLINIC_TOKEN_TTL_SECS must not exceed {}", MAX_TOKEN_TTL_SECS));
            }
            cfg.token_ttl = Duration::from_secs(secs);
        }
        if let Some(s) = lookup("CLINIC_STORE_TIMEOUT_MS") {
            let ms = s.parse::<u64>().with_context(|| format!("invalid CLINIC_STORE_TIMEOUT_MS: {}", s))?;
            if ms == 0 { return Err(anyhow!("CLINIC_STORE_TIMEOUT_MS must be positive")); }
            cfg.store_timeout = Duration::from_millis(ms);
        }
        match (lookup("CLINIC_ADMIN_EMAIL"), lookup("CLINIC_ADMIN_PASSWORD")) {
            (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => cfg.bootstrap_admin = Some((e, p)),
            (None, None) => {}
            _ => return Err(anyhow!("CLINIC_ADMIN_EMAIL and CLINIC_ADMIN_PASSWORD must be set together")),
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn secret_is_required() {
        assert!(ServerConfig::from_lookup(lookup_from(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("CLINIC_TOKEN_SECRET", "short")])).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[("CLINIC_TOKEN_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.http_port, 3001);
        assert_eq!(cfg.db_path, "clinic.db");
        assert_eq!(cfg.token_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.store_timeout, Duration::from_millis(5000));
        assert!(cfg.bootstrap_admin.is_none());
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("CLINIC_TOKEN_SECRET", SECRET),
            ("CLINIC_HTTP_PORT", "8080"),
            ("CLINIC_DB_PATH", ":memory:"),
            ("CLINIC_TOKEN_TTL_SECS", "60"),
            ("CLINIC_ADMIN_EMAIL", "admin@clinic.test"),
            ("CLINIC_ADMIN_PASSWORD", "pw"),
        ])).unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, ":memory:");
        assert_eq!(cfg.token_ttl, Duration::from_secs(60));
        assert_eq!(cfg.bootstrap_admin, Some(("admin@clinic.test".to_string(), "pw".to_string())));

        let bad = ServerConfig::from_lookup(lookup_from(&[("CLINIC_TOKEN_SECRET", SECRET), ("CLINIC_HTTP_PORT", "nope")]));
        assert!(bad.is_err());
        let huge_ttl = ServerConfig::from_lookup(lookup_from(&[
            ("CLINIC_TOKEN_SECRET", SECRET),
            ("CLINIC_TOKEN_TTL_SECS", "18446744073709551615"),
        ]));
        assert!(huge_ttl.is_err());
        let max_ttl = MAX_TOKEN_TTL_SECS.to_string();
        let cfg = ServerConfig::from_lookup(lookup_from(&[("CLINIC_TOKEN_SECRET", SECRET), ("CLINIC_TOKEN_TTL_SECS", max_ttl.as_str())])).unwrap();
        assert_eq!(cfg.token_ttl, Duration::from_secs(MAX_TOKEN_TTL_SECS));
        let half_admin = ServerConfig::from_lookup(lookup_from(&[("CLINIC_TOKEN_SECRET", SECRET), ("CLINIC_ADMIN_EMAIL", "a@b.c")]));
        assert!(half_admin.is_err());
    }
}
