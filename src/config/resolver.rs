//! Top-level configuration resolution.
//!
//! Turns defaults, the config file and the command line into a validated
//! [`RuntimeConfig`]. Nothing here touches the network; the only side
//! effects are directory creation and reading the password file.

use std::ffi::OsString;

use crate::config::credentials::{resolve_ui_password, CredentialSources};
use crate::config::defaults::{Defaults, UI_PASSWORD_MIN_LENGTH};
use crate::config::error::ConfigError;
use crate::config::integrated::{LndValidator, NodeValidator};
use crate::config::loader::{load_layers, Layered};
use crate::config::paths::{clean_and_expand_path, make_directories};
use crate::config::schema::{LndMode, RuntimeConfig, TlsStrategy, UiPassword};
use crate::config::subdaemons::{validate_subdaemons, BuiltinSubDaemons, SubDaemonValidator};
use crate::config::validation::{resolve_mode, ModeResolution};
use crate::net::addr::ListenAddress;

const DEFAULT_HTTPS_PORT: u16 = 443;
const DEFAULT_HTTP_PORT: u16 = 80;

/// The validators consulted during resolution.
#[derive(Clone, Copy)]
pub struct Validators<'a> {
    pub node: &'a dyn NodeValidator,
    pub subdaemons: &'a dyn SubDaemonValidator,
}

static LND_VALIDATOR: LndValidator = LndValidator;
static BUILTIN_SUBDAEMONS: BuiltinSubDaemons = BuiltinSubDaemons;

impl Validators<'static> {
    pub fn builtin() -> Self {
        Self {
            node: &LND_VALIDATOR,
            subdaemons: &BUILTIN_SUBDAEMONS,
        }
    }
}

/// A validated configuration and the warning held back until logging runs.
#[derive(Debug)]
pub struct Resolved {
    pub config: RuntimeConfig,
    pub deferred: Option<ConfigError>,
}

impl Resolved {
    /// Emit the deferred config file warning, if any.
    pub fn log_deferred(&self) {
        if let Some(warning) = &self.deferred {
            tracing::warn!(error = %warning, "Continuing without config file");
        }
    }
}

/// Resolve the runtime configuration from `argv` (program name first).
///
/// `env` looks up the environment variable named by `--uipassword_env`.
pub fn load_and_validate<I, T, F>(
    defaults: &Defaults,
    argv: I,
    validators: Validators<'_>,
    env: F,
) -> Result<Resolved, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: Fn(&str) -> Option<String>,
{
    let Layered { config: raw, deferred } = load_layers(defaults, argv)?;
    let raw = raw.rebase_on_lit_dir(defaults);

    let lit_dir = clean_and_expand_path(&raw.lit_dir);
    make_directories(&lit_dir)?;

    let ModeResolution {
        mode,
        network,
        logging,
    } = resolve_mode(&raw, defaults, validators.node)?;

    let lets_encrypt_dir = clean_and_expand_path(&raw.lets_encrypt_dir);
    let lets_encrypt_host = raw.lets_encrypt_host.trim().to_string();
    if raw.lets_encrypt {
        if lets_encrypt_host.is_empty() {
            return Err(ConfigError::MissingAcmeHost);
        }
        make_directories(&lets_encrypt_dir)?;
    }

    let password = resolve_ui_password(
        CredentialSources {
            direct: &raw.ui_password,
            file: &raw.ui_password_file,
            env_var: &raw.ui_password_env,
        },
        env,
    )?;
    if password.chars().count() < UI_PASSWORD_MIN_LENGTH {
        return Err(ConfigError::CredentialTooWeak {
            min_len: UI_PASSWORD_MIN_LENGTH,
        });
    }

    let https_listen = parse_listen("httpslisten", &raw.https_listen, DEFAULT_HTTPS_PORT)?;
    let insecure_listen = match raw.insecure_listen.trim() {
        "" => None,
        addr => Some(parse_listen("insecure-httplisten", addr, DEFAULT_HTTP_PORT)?),
    };

    let tls = match &mode {
        _ if raw.lets_encrypt => TlsStrategy::Acme {
            host: lets_encrypt_host,
            cache_dir: lets_encrypt_dir,
            listen: raw.lets_encrypt_listen.trim().to_string(),
        },
        LndMode::Remote(remote) => TlsStrategy::SelfSigned {
            cert_path: remote.lit_tls_cert_path.clone(),
            key_path: remote.lit_tls_key_path.clone(),
        },
        LndMode::Integrated(lnd) => TlsStrategy::Delegated {
            cert_path: lnd.tls_cert_path.clone(),
            key_path: lnd.tls_key_path.clone(),
        },
    };

    let subdaemons = validate_subdaemons(&raw, network, validators.subdaemons)?;

    Ok(Resolved {
        config: RuntimeConfig {
            mode,
            network,
            ui_password: UiPassword::new(password),
            tls,
            https_listen,
            insecure_listen,
            lit_dir,
            logging,
            subdaemons,
        },
        deferred,
    })
}

fn parse_listen(
    field: &'static str,
    addr: &str,
    default_port: u16,
) -> Result<ListenAddress, ConfigError> {
    ListenAddress::parse(addr, default_port).map_err(|e| ConfigError::InvalidListenAddress {
        field,
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}
