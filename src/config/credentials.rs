//! UI password resolution.
//!
//! # Responsibilities
//! - Read the password from exactly one source: the value itself, a file, or
//!   a named environment variable, in that priority order
//! - Trim surrounding whitespace from whichever source wins
//!
//! The minimum length is enforced by the caller.

use std::fs;
use std::path::PathBuf;

use crate::config::error::ConfigError;

/// Where the UI password may come from, as configured.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSources<'a> {
    pub direct: &'a str,
    pub file: &'a str,
    pub env_var: &'a str,
}

/// Resolve the UI password. `env` looks up environment variables so tests
/// can avoid mutating the process environment.
pub fn resolve_ui_password<F>(sources: CredentialSources<'_>, env: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let direct = sources.direct.trim();
    if !direct.is_empty() {
        return Ok(direct.to_string());
    }

    let file = sources.file.trim();
    if !file.is_empty() {
        let content = fs::read_to_string(file).map_err(|e| ConfigError::FileUnreadable {
            path: PathBuf::from(file),
            reason: e.to_string(),
        })?;
        return Ok(content.trim().to_string());
    }

    let var = sources.env_var.trim();
    if !var.is_empty() {
        let value = env(var).unwrap_or_default();
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EnvVarEmpty(var.to_string()));
        }
        return Ok(value.to_string());
    }

    Err(ConfigError::NoCredentialConfigured)
}

/// Environment lookup backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
