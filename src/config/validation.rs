//! Mode validation.
//!
//! # Responsibilities
//! - Pick the operating mode from its string form
//! - Integrated: delegate to the node validator, adopt its network flag
//! - Remote: check the network name, fix up macaroon and base-dir paths,
//!   and set up litd's own logging since no node does it for us
//!
//! # Design Decisions
//! - Returns the first error; resolution stops there
//! - The inactive mode's block is dropped, but its macaroon settings are
//!   still checked for consistency

use crate::config::defaults::{self, Defaults};
use crate::config::error::ConfigError;
use crate::config::integrated::NodeValidator;
use crate::config::paths::{clean_and_expand_path, make_directories};
use crate::config::schema::{IntegratedParams, LndMode, LogSettings, Network, RawConfig, RemoteParams};
use crate::observability::parse_debug_level;

/// Outcome of mode validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeResolution {
    pub mode: LndMode,
    pub network: Network,
    pub logging: LogSettings,
}

/// Resolve the operating mode of `raw`.
pub fn resolve_mode(
    raw: &RawConfig,
    defaults: &Defaults,
    node: &dyn NodeValidator,
) -> Result<ModeResolution, ConfigError> {
    match raw.lnd_mode.trim() {
        "integrated" => {
            raw.remote.lnd.check_macaroon_exclusivity(defaults)?;
            resolve_integrated(raw.lnd.clone(), defaults, node)
        }
        "remote" => resolve_remote(raw, defaults),
        other => Err(ConfigError::InvalidMode(other.to_string())),
    }
}

fn resolve_integrated(
    params: IntegratedParams,
    defaults: &Defaults,
    node: &dyn NodeValidator,
) -> Result<ModeResolution, ConfigError> {
    let params = node.validate(params, defaults)?;

    let network = params
        .bitcoin
        .selected()
        .first()
        .copied()
        .ok_or(ConfigError::NoNetworkSelected)?;

    // Only one listener can be handed to the node.
    if params.rpc_listeners.len() > 1 {
        return Err(ConfigError::TooManyListeners(params.rpc_listeners.len()));
    }

    let logging = LogSettings {
        dir: params
            .log_dir
            .join(defaults::LND_CHAIN)
            .join(network.as_str()),
        filename: defaults::LND_LOG_FILENAME.to_string(),
        max_files: params.max_log_files,
        filter: parse_debug_level(&params.debug_level)?,
    };

    Ok(ModeResolution {
        mode: LndMode::Integrated(params),
        network,
        logging,
    })
}

fn resolve_remote(raw: &RawConfig, defaults: &Defaults) -> Result<ModeResolution, ConfigError> {
    let RemoteParams { mut lnd, .. } = raw.remote.clone();

    let network: Network = lnd
        .network
        .trim()
        .parse()
        .map_err(ConfigError::InvalidNetwork)?;
    lnd.network = network.to_string();
    lnd.check_macaroon_exclusivity(defaults)?;

    // Operators only need to change the network if everything else is
    // left at its default.
    if network.as_str() != defaults::DEFAULT_NETWORK && !lnd.has_custom_macaroon_dir(defaults) {
        lnd.macaroon_dir = defaults.lnd_macaroon_dir(network.as_str());
    }

    let mut remote = raw.clone().rebase_on_lit_dir(defaults).remote;
    remote.lnd = lnd;
    remote.lit_tls_cert_path = clean_and_expand_path(&remote.lit_tls_cert_path);
    remote.lit_tls_key_path = clean_and_expand_path(&remote.lit_tls_key_path);
    remote.lit_log_dir = clean_and_expand_path(&remote.lit_log_dir);

    for file in [&remote.lit_tls_cert_path, &remote.lit_tls_key_path] {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            make_directories(parent)?;
        }
    }

    let logging = LogSettings {
        dir: remote.lit_log_dir.join(network.as_str()),
        filename: defaults::DEFAULT_LOG_FILENAME.to_string(),
        max_files: remote.lit_max_log_files,
        filter: parse_debug_level(&remote.lit_debug_level)?,
    };

    Ok(ModeResolution {
        mode: LndMode::Remote(remote),
        network,
        logging,
    })
}
