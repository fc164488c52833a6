//! Configuration error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while resolving the runtime configuration.
///
/// Every variant except [`ConfigError::ConfigFileAbsent`] and
/// [`ConfigError::RequestedExit`] aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A command line flag or the config file is malformed.
    #[error("error parsing {source_name}: {message}")]
    ConfigSyntax { source_name: String, message: String },

    /// The config file could not be read. Reported as a warning only.
    #[error("unable to read config file {}: {reason}", path.display())]
    ConfigFileAbsent { path: PathBuf, reason: String },

    /// Help or version output was requested; not an error.
    #[error("{0}")]
    RequestedExit(String),

    #[error("invalid lnd mode {0:?}, must be either 'integrated' or 'remote'")]
    InvalidMode(String),

    #[error("error validating lnd remote network: unknown network {0:?}")]
    InvalidNetwork(String),

    #[error("no network selected, set one of --lnd.bitcoin.mainnet, testnet, regtest or simnet")]
    NoNetworkSelected,

    #[error("cannot set both macaroon dir and macaroon path")]
    ConflictingMacaroonConfig,

    #[error(
        "mandatory password for UI not configured. specify either a password directly \
         or a file or environment variable that contains the password"
    )]
    NoCredentialConfigured,

    #[error("please set a strong password for the UI, at least {min_len} characters long")]
    CredentialTooWeak { min_len: usize },

    #[error("could not read file {}: {reason}", path.display())]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("environment variable {0} is empty")]
    EnvVarEmpty(String),

    #[error("host must be set when using let's encrypt")]
    MissingAcmeHost,

    #[error("litd only supports one RPC listener at a time, got {0}")]
    TooManyListeners(usize),

    #[error("failed to create directory {}: {reason}", path.display())]
    DirectoryCreateFailed { path: PathBuf, reason: String },

    #[error("invalid {field} address {addr:?}: {reason}")]
    InvalidListenAddress {
        field: &'static str,
        addr: String,
        reason: String,
    },

    #[error("invalid log level {level:?}: {reason}")]
    InvalidLogLevel { level: String, reason: String },

    /// The in-process node rejected its configuration.
    #[error("lnd config invalid: {0}")]
    NodeValidation(String),

    /// A proxied sub-daemon rejected its configuration.
    #[error("{daemon} config invalid: {reason}")]
    SubDaemonValidation { daemon: &'static str, reason: String },
}

impl ConfigError {
    /// Whether startup may continue despite this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConfigError::ConfigFileAbsent { .. } | ConfigError::RequestedExit(_)
        )
    }
}

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;
