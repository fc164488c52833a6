//! Validation of the in-process node's configuration.
//!
//! The node owns its configuration surface; litd only needs the parts that
//! decide where its certificate, macaroons and RPC listener live.

use std::path::PathBuf;

use crate::config::defaults::{Defaults, DEFAULT_LND_RPC_PORT, DEFAULT_REMOTE_LND_RPC_SERVER};
use crate::config::error::ConfigError;
use crate::config::paths::clean_and_expand_path;
use crate::config::schema::{default_admin_macaroon, IntegratedParams};
use crate::net::addr::ListenAddress;
use crate::observability::parse_debug_level;

/// Validates the node configuration in integrated mode.
pub trait NodeValidator: Send + Sync {
    /// Check `params` and fill in derived defaults.
    fn validate(&self, params: IntegratedParams, defaults: &Defaults)
        -> Result<IntegratedParams, ConfigError>;
}

/// The built-in rules lnd applies to its own configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct LndValidator;

impl NodeValidator for LndValidator {
    fn validate(
        &self,
        mut params: IntegratedParams,
        defaults: &Defaults,
    ) -> Result<IntegratedParams, ConfigError> {
        let lnd_dir = clean_and_expand_path(&params.lnd_dir);
        let moved = lnd_dir != clean_and_expand_path(&defaults.lnd_dir);

        // Files still at their defaults follow a relocated data dir.
        let relocate = |path: PathBuf, default: PathBuf| {
            let path = clean_and_expand_path(path);
            match default.strip_prefix(&defaults.lnd_dir) {
                Ok(rel) if moved && path == clean_and_expand_path(&default) => lnd_dir.join(rel),
                _ => path,
            }
        };
        params.tls_cert_path = relocate(params.tls_cert_path, defaults.lnd_tls_cert_path());
        params.tls_key_path = relocate(params.tls_key_path, defaults.lnd_tls_key_path());
        params.log_dir = relocate(params.log_dir, defaults.lnd_log_dir());
        params.lnd_dir = lnd_dir;

        let networks = params.bitcoin.selected();
        if networks.len() > 1 {
            let names: Vec<_> = networks.iter().map(|n| n.as_str()).collect();
            return Err(ConfigError::NodeValidation(format!(
                "the mainnet, testnet, regtest, and simnet params can't be used together, got {}",
                names.join(", ")
            )));
        }

        parse_debug_level(&params.debug_level)?;

        if params.rpc_listeners.is_empty() {
            params.rpc_listeners.push(DEFAULT_REMOTE_LND_RPC_SERVER.to_string());
        }
        params.rpc_listeners = params
            .rpc_listeners
            .iter()
            .map(|listener| {
                ListenAddress::parse(listener, DEFAULT_LND_RPC_PORT)
                    .map(|addr| addr.to_string())
                    .map_err(|e| ConfigError::InvalidListenAddress {
                        field: "lnd.rpclisten",
                        addr: listener.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;

        params.admin_macaroon_path = match (params.admin_macaroon_path.take(), networks.first()) {
            (Some(path), _) if !path.as_os_str().is_empty() => Some(clean_and_expand_path(path)),
            (_, Some(network)) => Some(default_admin_macaroon(&params.lnd_dir, *network)),
            (_, None) => None,
        };

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ChainFlags, RawConfig};
    use std::path::Path;

    fn params(defaults: &Defaults) -> IntegratedParams {
        let mut p = RawConfig::from_defaults(defaults).lnd;
        p.bitcoin = ChainFlags {
            testnet: true,
            ..Default::default()
        };
        p
    }

    #[test]
    fn fills_listener_and_macaroon() {
        let d = Defaults::rooted_at(Path::new("/home/dave"));
        let p = LndValidator.validate(params(&d), &d).unwrap();

        assert_eq!(p.rpc_listeners.len(), 1);
        assert!(p.rpc_listeners[0].ends_with(":10009"));
        assert_eq!(
            p.admin_macaroon_path,
            Some(PathBuf::from(
                "/home/dave/.lnd/data/chain/bitcoin/testnet/admin.macaroon"
            ))
        );
    }

    #[test]
    fn relocated_data_dir_moves_default_files() {
        let d = Defaults::rooted_at(Path::new("/home/dave"));
        let mut p = params(&d);
        p.lnd_dir = PathBuf::from("/data/lnd");
        p.tls_key_path = PathBuf::from("/keys/lnd.key");

        let p = LndValidator.validate(p, &d).unwrap();
        assert_eq!(p.tls_cert_path, PathBuf::from("/data/lnd/tls.cert"));
        assert_eq!(p.tls_key_path, PathBuf::from("/keys/lnd.key"));
        assert_eq!(p.log_dir, PathBuf::from("/data/lnd/logs"));
    }

    #[test]
    fn rejects_several_networks() {
        let d = Defaults::rooted_at(Path::new("/home/dave"));
        let mut p = params(&d);
        p.bitcoin.regtest = true;
        assert!(matches!(
            LndValidator.validate(p, &d),
            Err(ConfigError::NodeValidation(_))
        ));
    }

    #[test]
    fn rejects_bad_listener() {
        let d = Defaults::rooted_at(Path::new("/home/dave"));
        let mut p = params(&d);
        p.rpc_listeners = vec!["127.0.0.1:notaport".into()];
        assert!(matches!(
            LndValidator.validate(p, &d),
            Err(ConfigError::InvalidListenAddress { field: "lnd.rpclisten", .. })
        ));
    }
}
