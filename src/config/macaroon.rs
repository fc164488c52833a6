//! Macaroon path resolution for the remote node connection.
//!
//! An operator either points at one pre-baked macaroon carrying exactly the
//! permissions the sub-daemons need, or at the directory in which the node
//! keeps its standard macaroons. Setting both is rejected.

use std::path::PathBuf;

use crate::config::defaults::{Defaults, DEFAULT_LND_MACAROON};
use crate::config::error::ConfigError;
use crate::config::paths::clean_and_expand_path;
use crate::config::schema::RemoteDaemonParams;

impl RemoteDaemonParams {
    /// The single file to present as the bearer credential.
    pub fn resolve_macaroon_path(&self) -> PathBuf {
        match &self.macaroon_path {
            Some(path) if !path.as_os_str().is_empty() => clean_and_expand_path(path),
            _ => clean_and_expand_path(&self.macaroon_dir).join(DEFAULT_LND_MACAROON),
        }
    }

    /// Whether the macaroon dir was changed from its default.
    pub fn has_custom_macaroon_dir(&self, defaults: &Defaults) -> bool {
        clean_and_expand_path(&self.macaroon_dir)
            != clean_and_expand_path(defaults.remote_macaroon_dir())
    }

    /// A macaroon path and a non-default macaroon dir are mutually exclusive.
    pub fn check_macaroon_exclusivity(&self, defaults: &Defaults) -> Result<(), ConfigError> {
        let has_path = self
            .macaroon_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());

        if has_path && self.has_custom_macaroon_dir(defaults) {
            return Err(ConfigError::ConflictingMacaroonConfig);
        }
        Ok(())
    }
}
