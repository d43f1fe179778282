//! Secret resolution by environment variable name.
//!
//! Mirrors the contract the rest of the fleet already follows: a value
//! never travels through config files or code, only a variable *name* does;
//! callers resolve the name once at startup and pass the result down.
//! `Debug` impls redact the resolved value; error messages reference only
//! the variable name.

use anyhow::{bail, Result};

/// A resolved secret value. `Debug` never prints the contents.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<REDACTED>")
    }
}

fn resolve(var_name: &str) -> Option<Secret> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(Secret(v)),
        _ => None,
    }
}

/// Resolve a required secret, failing with the variable name (never its
/// value) if it is unset or blank.
pub fn required(var_name: &str) -> Result<Secret> {
    resolve(var_name).ok_or_else(|| anyhow::anyhow!("missing required secret env var {var_name}"))
}

/// Resolve an optional secret.
pub fn optional(var_name: &str) -> Option<Secret> {
    resolve(var_name)
}

/// Passthrough configuration for the authentication collaborator (OAuth +
/// session store). This crate never validates sessions or tokens itself —
/// the fields below are resolved for handoff to that out-of-scope
/// collaborator (e.g. forwarded as headers, or read by a sidecar).
#[derive(Clone)]
pub struct AuthCollaboratorSecrets {
    pub client_id: Secret,
    pub client_secret: Secret,
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub encryption_key: Secret,
    pub session_ttl_seconds: u64,
}

impl std::fmt::Debug for AuthCollaboratorSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCollaboratorSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("callback_url", &self.callback_url)
            .field("scopes", &self.scopes)
            .field("encryption_key", &self.encryption_key)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .finish()
    }
}

impl AuthCollaboratorSecrets {
    pub fn from_env() -> Result<Self> {
        let encryption_key = required("AUTH_ENCRYPTION_KEY")?;
        if encryption_key.expose().len() < 32 {
            bail!("env var AUTH_ENCRYPTION_KEY must be at least 32 bytes");
        }
        let scopes = std::env::var("AUTH_SCOPES").unwrap_or_default();
        Ok(Self {
            client_id: required("AUTH_CLIENT_ID")?,
            client_secret: required("AUTH_CLIENT_SECRET")?,
            callback_url: std::env::var("AUTH_CALLBACK_URL")
                .map_err(|_| anyhow::anyhow!("missing required env var AUTH_CALLBACK_URL"))?,
            scopes: scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            encryption_key,
            session_ttl_seconds: crate::optional_or("AUTH_SESSION_TTL_SECONDS", 3600)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_output_is_redacted() {
        let s = Secret("super-secret-value".to_string());
        assert_eq!(format!("{s:?}"), "<REDACTED>");
    }
}
