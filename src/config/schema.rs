//! Configuration schema definitions.
//!
//! [`RawConfig`] is the layered, unvalidated view in which both the
//! integrated and the remote blocks are present. [`RuntimeConfig`] is the
//! resolved result in which exactly one of them survives, carried by the
//! [`LndMode`] sum type.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::defaults::{self, Defaults};
use crate::config::paths::clean_and_expand_path;
use crate::net::addr::{dial_address, ListenAddress};

/// Bitcoin network the node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Simnet,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Mainnet,
        Network::Testnet,
        Network::Regtest,
        Network::Simnet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Simnet => "simnet",
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "simnet" => Ok(Network::Simnet),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConfig {
    pub https_listen: String,
    /// Empty disables the plaintext listener.
    pub insecure_listen: String,

    pub ui_password: String,
    pub ui_password_file: String,
    pub ui_password_env: String,

    pub lets_encrypt: bool,
    pub lets_encrypt_host: String,
    pub lets_encrypt_dir: PathBuf,
    pub lets_encrypt_listen: String,

    pub lnd_mode: String,
    pub lit_dir: PathBuf,
    pub config_file: PathBuf,

    pub remote: RemoteParams,
    pub lnd: IntegratedParams,

    pub loop_: SubDaemonConfig,
    pub pool: SubDaemonConfig,
    pub faraday: FaradayConfig,
}

impl RawConfig {
    /// The bottom layer of the pipeline: compiled-in defaults only.
    pub fn from_defaults(d: &Defaults) -> Self {
        Self {
            https_listen: defaults::DEFAULT_HTTPS_LISTEN.to_string(),
            insecure_listen: String::new(),
            ui_password: String::new(),
            ui_password_file: String::new(),
            ui_password_env: String::new(),
            lets_encrypt: false,
            lets_encrypt_host: String::new(),
            lets_encrypt_dir: d.lets_encrypt_dir(),
            lets_encrypt_listen: defaults::DEFAULT_LETS_ENCRYPT_LISTEN.to_string(),
            lnd_mode: defaults::DEFAULT_LND_MODE.to_string(),
            lit_dir: d.lit_dir.clone(),
            config_file: d.config_file(),
            remote: RemoteParams {
                lit_tls_cert_path: d.tls_cert_path(),
                lit_tls_key_path: d.tls_key_path(),
                lit_log_dir: d.log_dir(),
                lit_max_log_files: defaults::DEFAULT_MAX_LOG_FILES,
                lit_debug_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
                lnd: RemoteDaemonParams {
                    network: defaults::DEFAULT_NETWORK.to_string(),
                    rpc_server: defaults::DEFAULT_REMOTE_LND_RPC_SERVER.to_string(),
                    macaroon_dir: d.remote_macaroon_dir(),
                    macaroon_path: None,
                    tls_cert_path: d.lnd_tls_cert_path(),
                },
            },
            lnd: IntegratedParams {
                lnd_dir: d.lnd_dir.clone(),
                tls_cert_path: d.lnd_tls_cert_path(),
                tls_key_path: d.lnd_tls_key_path(),
                admin_macaroon_path: None,
                log_dir: d.lnd_log_dir(),
                max_log_files: defaults::DEFAULT_MAX_LOG_FILES,
                debug_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
                rpc_listeners: Vec::new(),
                bitcoin: ChainFlags::default(),
            },
            loop_: SubDaemonConfig::new(d.loop_dir.clone()),
            pool: SubDaemonConfig::new(d.pool_dir.clone()),
            faraday: FaradayConfig {
                daemon: SubDaemonConfig::new(d.faraday_dir.clone()),
                connect_bitcoin: false,
                bitcoin_host: String::new(),
            },
        }
    }
}

/// Which of the four networks the in-process node was told to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainFlags {
    pub mainnet: bool,
    pub testnet: bool,
    pub regtest: bool,
    pub simnet: bool,
}

impl ChainFlags {
    /// Every network whose flag is set.
    pub fn selected(&self) -> Vec<Network> {
        [
            (self.mainnet, Network::Mainnet),
            (self.testnet, Network::Testnet),
            (self.regtest, Network::Regtest),
            (self.simnet, Network::Simnet),
        ]
        .into_iter()
        .filter_map(|(set, network)| set.then_some(network))
        .collect()
    }
}

/// Configuration of the in-process node (integrated mode).
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedParams {
    pub lnd_dir: PathBuf,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    /// Filled in by node validation from the data dir and network.
    pub admin_macaroon_path: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub max_log_files: usize,
    pub debug_level: String,
    /// Listen addresses of the node's RPC server.
    pub rpc_listeners: Vec<String>,
    pub bitcoin: ChainFlags,
}

/// litd's own settings when connecting to a remote node.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParams {
    pub lit_tls_cert_path: PathBuf,
    pub lit_tls_key_path: PathBuf,
    pub lit_log_dir: PathBuf,
    pub lit_max_log_files: usize,
    pub lit_debug_level: String,
    pub lnd: RemoteDaemonParams,
}

/// How to reach the remote node.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDaemonParams {
    pub network: String,
    /// host:port of the node's RPC server.
    pub rpc_server: String,
    /// Legacy: directory holding all of the node's macaroons.
    pub macaroon_dir: PathBuf,
    /// A single macaroon carrying every permission the sub-daemons need.
    pub macaroon_path: Option<PathBuf>,
    /// The node's TLS certificate used to verify its identity.
    pub tls_cert_path: PathBuf,
}

/// Settings shared by the proxied sub-daemons.
#[derive(Debug, Clone, PartialEq)]
pub struct SubDaemonConfig {
    pub dir: PathBuf,
    /// Forced to the resolved network before validation.
    pub network: String,
    pub macaroon_path: Option<PathBuf>,
}

impl SubDaemonConfig {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            network: defaults::DEFAULT_NETWORK.to_string(),
            macaroon_path: None,
        }
    }
}

/// Faraday additionally may connect to a bitcoin backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FaradayConfig {
    pub daemon: SubDaemonConfig,
    pub connect_bitcoin: bool,
    pub bitcoin_host: String,
}

/// The resolved operating mode. Only the active mode's parameters exist.
#[derive(Debug, Clone, PartialEq)]
pub enum LndMode {
    Integrated(IntegratedParams),
    Remote(RemoteParams),
}

impl LndMode {
    pub fn name(&self) -> &'static str {
        match self {
            LndMode::Integrated(_) => "integrated",
            LndMode::Remote(_) => "remote",
        }
    }
}

/// How the TLS certificate for the external endpoint is obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum TlsStrategy {
    /// Let's Encrypt via the HTTP-01 challenge.
    Acme {
        host: String,
        cache_dir: PathBuf,
        listen: String,
    },
    /// Generated once under the base directory, then reused.
    SelfSigned { cert_path: PathBuf, key_path: PathBuf },
    /// Owned by the in-process node.
    Delegated { cert_path: PathBuf, key_path: PathBuf },
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Network specific log directory.
    pub dir: PathBuf,
    pub filename: String,
    pub max_files: usize,
    /// `EnvFilter` directives translated from the configured level.
    pub filter: String,
}

impl LogSettings {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

/// The UI password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct UiPassword(String);

impl UiPassword {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UiPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UiPassword(<redacted>)")
    }
}

/// Validated sub-daemon configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct SubDaemons {
    pub loop_: SubDaemonConfig,
    pub pool: SubDaemonConfig,
    pub faraday: FaradayConfig,
}

/// Fully resolved configuration, shared read-only once validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub mode: LndMode,
    pub network: Network,
    pub ui_password: UiPassword,
    pub tls: TlsStrategy,
    pub https_listen: ListenAddress,
    pub insecure_listen: Option<ListenAddress>,
    pub lit_dir: PathBuf,
    pub logging: LogSettings,
    pub subdaemons: SubDaemons,
}

/// What the proxying layer needs to open a client connection to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LndConnectParams {
    pub rpc_server: String,
    pub network: Network,
    pub tls_cert_path: PathBuf,
    pub macaroon_path: PathBuf,
}

impl RuntimeConfig {
    /// Connection parameters for the node in either mode.
    ///
    /// In integrated mode the node's first RPC listener is dialed, with
    /// wildcard IPs rewritten to loopback.
    pub fn lnd_connect_params(&self) -> LndConnectParams {
        match &self.mode {
            LndMode::Remote(remote) => LndConnectParams {
                rpc_server: remote.lnd.rpc_server.clone(),
                network: self.network,
                tls_cert_path: clean_and_expand_path(&remote.lnd.tls_cert_path),
                macaroon_path: remote.lnd.resolve_macaroon_path(),
            },
            LndMode::Integrated(lnd) => {
                let listen = lnd
                    .rpc_listeners
                    .first()
                    .map(String::as_str)
                    .unwrap_or(defaults::DEFAULT_REMOTE_LND_RPC_SERVER);
                LndConnectParams {
                    rpc_server: dial_address(listen),
                    network: self.network,
                    tls_cert_path: lnd.tls_cert_path.clone(),
                    macaroon_path: lnd
                        .admin_macaroon_path
                        .clone()
                        .unwrap_or_else(|| default_admin_macaroon(&lnd.lnd_dir, self.network)),
                }
            }
        }
    }
}

/// `<lnddir>/data/chain/bitcoin/<network>/admin.macaroon`
pub fn default_admin_macaroon(lnd_dir: &Path, network: Network) -> PathBuf {
    defaults::lnd_network_dir(lnd_dir, network.as_str()).join(defaults::DEFAULT_LND_MACAROON)
}
