//! Configuration of the proxied sub-daemons (loop, pool, faraday).
//!
//! Settings such as the network are not left to the operator: they are
//! forced to the resolved values before each daemon's validator runs.

use std::path::Path;

use crate::config::defaults::{
    FARADAY_MACAROON_FILENAME, LOOP_MACAROON_FILENAME, POOL_MACAROON_FILENAME,
};
use crate::config::error::ConfigError;
use crate::config::paths::clean_and_expand_path;
use crate::config::schema::{FaradayConfig, Network, RawConfig, SubDaemonConfig, SubDaemons};

/// Validation hooks for each sub-daemon.
pub trait SubDaemonValidator: Send + Sync {
    fn validate_loop(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError>;
    fn validate_pool(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError>;
    fn validate_faraday(&self, cfg: FaradayConfig) -> Result<FaradayConfig, ConfigError>;
}

/// Built-in rules: clean directories and default each macaroon to
/// `<dir>/<network>/<daemon>.macaroon`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSubDaemons;

fn normalize(mut cfg: SubDaemonConfig, macaroon: &str) -> SubDaemonConfig {
    cfg.dir = clean_and_expand_path(&cfg.dir);
    cfg.macaroon_path = Some(match cfg.macaroon_path.take() {
        Some(path) if !path.as_os_str().is_empty() => clean_and_expand_path(path),
        _ => default_macaroon(&cfg.dir, &cfg.network, macaroon),
    });
    cfg
}

fn default_macaroon(dir: &Path, network: &str, file: &str) -> std::path::PathBuf {
    dir.join(network).join(file)
}

impl SubDaemonValidator for BuiltinSubDaemons {
    fn validate_loop(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError> {
        Ok(normalize(cfg, LOOP_MACAROON_FILENAME))
    }

    fn validate_pool(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError> {
        Ok(normalize(cfg, POOL_MACAROON_FILENAME))
    }

    fn validate_faraday(&self, mut cfg: FaradayConfig) -> Result<FaradayConfig, ConfigError> {
        cfg.daemon = normalize(cfg.daemon, FARADAY_MACAROON_FILENAME);
        cfg.bitcoin_host = cfg.bitcoin_host.trim().to_string();
        if cfg.connect_bitcoin && cfg.bitcoin_host.is_empty() {
            return Err(ConfigError::SubDaemonValidation {
                daemon: "faraday",
                reason: "bitcoin host must be set when connecting to a bitcoin backend".into(),
            });
        }
        Ok(cfg)
    }
}

/// Force the resolved network onto every sub-daemon and validate each.
pub fn validate_subdaemons(
    raw: &RawConfig,
    network: Network,
    validator: &dyn SubDaemonValidator,
) -> Result<SubDaemons, ConfigError> {
    let mut loop_ = raw.loop_.clone();
    loop_.network = network.to_string();
    let loop_ = validator.validate_loop(loop_)?;

    let mut pool = raw.pool.clone();
    pool.network = network.to_string();
    let pool = validator.validate_pool(pool)?;

    let mut faraday = raw.faraday.clone();
    faraday.daemon.network = network.to_string();
    let faraday = validator.validate_faraday(faraday)?;

    Ok(SubDaemons {
        loop_,
        pool,
        faraday,
    })
}
