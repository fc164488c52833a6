//! Configuration layers.
//!
//! A [`ConfigLayer`] is one source of overrides: the command line or the
//! config file. The same type is parsed by clap and deserialized by serde,
//! so flag names and file keys cannot drift apart. Every field is optional;
//! [`RawConfig::overlay`] applies only what a layer actually sets.
//!
//! Config file keys mirror the long flag names. Namespaced flags become
//! tables:
//!
//! ```toml
//! uipassword = "a strong password"
//! lnd-mode = "remote"
//!
//! [remote.lnd]
//! network = "testnet"
//! rpcserver = "10.0.0.2:10009"
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{error::ErrorKind, Args, Parser};
use serde::Deserialize;

use crate::config::error::ConfigError;
use crate::config::schema::RawConfig;

/// Overrides from one configuration source.
#[derive(Debug, Clone, Default, PartialEq, Parser, Deserialize)]
#[command(
    name = "litd",
    about = "Lightning Terminal daemon: one endpoint in front of lnd, loop, pool and faraday",
    disable_version_flag = true
)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// The host:port to listen for incoming HTTP/2 connections on.
    #[arg(long = "httpslisten", value_name = "HOST:PORT")]
    #[serde(rename = "httpslisten")]
    pub https_listen: Option<String>,

    /// The host:port to listen on with TLS disabled. Credentials are sent
    /// unencrypted; only use behind Tor or another encrypting layer.
    #[arg(long = "insecure-httplisten", value_name = "HOST:PORT")]
    #[serde(rename = "insecure-httplisten")]
    pub insecure_listen: Option<String>,

    /// The password that must be entered when using the UI.
    #[arg(long = "uipassword")]
    #[serde(rename = "uipassword")]
    pub ui_password: Option<String>,

    /// Read the UI password from this file instead.
    #[arg(long = "uipassword_file", value_name = "PATH")]
    #[serde(rename = "uipassword_file")]
    pub ui_password_file: Option<String>,

    /// Read the UI password from this environment variable instead.
    #[arg(long = "uipassword_env", value_name = "VAR")]
    #[serde(rename = "uipassword_env")]
    pub ui_password_env: Option<String>,

    /// Use Let's Encrypt to create the UI's TLS certificate.
    #[arg(long = "letsencrypt")]
    #[serde(rename = "letsencrypt")]
    pub lets_encrypt: bool,

    /// The host name to create a Let's Encrypt certificate for.
    #[arg(long = "letsencrypthost")]
    #[serde(rename = "letsencrypthost")]
    pub lets_encrypt_host: Option<String>,

    /// Where the Let's Encrypt key and certificate are cached.
    #[arg(long = "letsencryptdir", value_name = "DIR")]
    #[serde(rename = "letsencryptdir")]
    pub lets_encrypt_dir: Option<PathBuf>,

    /// The IP:port on which to answer Let's Encrypt challenges.
    #[arg(long = "letsencryptlisten", value_name = "IP:PORT")]
    #[serde(rename = "letsencryptlisten")]
    pub lets_encrypt_listen: Option<String>,

    /// Either 'integrated' or 'remote'.
    #[arg(long = "lnd-mode", value_name = "MODE")]
    #[serde(rename = "lnd-mode")]
    pub lnd_mode: Option<String>,

    /// The main directory for litd's config file, certificates and logs.
    #[arg(long = "lit-dir", value_name = "DIR")]
    #[serde(rename = "lit-dir")]
    pub lit_dir: Option<PathBuf>,

    /// Path to litd's configuration file.
    #[arg(long = "configfile", value_name = "PATH")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Print the version and exit.
    #[arg(short = 'V', long = "version")]
    #[serde(skip)]
    pub show_version: bool,

    #[command(flatten)]
    pub remote: RemoteLayer,

    #[command(flatten)]
    pub lnd: LndLayer,

    #[command(flatten)]
    #[serde(rename = "loop")]
    pub loop_: LoopLayer,

    #[command(flatten)]
    pub pool: PoolLayer,

    #[command(flatten)]
    pub faraday: FaradayLayer,
}

/// `--remote.*`: litd's own settings in remote mode.
#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteLayer {
    /// Where to write the self-signed TLS certificate.
    #[arg(id = "remote.lit-tlscertpath", long = "remote.lit-tlscertpath", value_name = "PATH")]
    #[serde(rename = "lit-tlscertpath")]
    pub lit_tls_cert_path: Option<PathBuf>,

    /// Where to write the self-signed TLS key.
    #[arg(id = "remote.lit-tlskeypath", long = "remote.lit-tlskeypath", value_name = "PATH")]
    #[serde(rename = "lit-tlskeypath")]
    pub lit_tls_key_path: Option<PathBuf>,

    /// Directory to log output.
    #[arg(id = "remote.lit-logdir", long = "remote.lit-logdir", value_name = "DIR")]
    #[serde(rename = "lit-logdir")]
    pub lit_log_dir: Option<PathBuf>,

    /// Maximum log files to keep (0 for no rotation).
    #[arg(id = "remote.lit-maxlogfiles", long = "remote.lit-maxlogfiles")]
    #[serde(rename = "lit-maxlogfiles")]
    pub lit_max_log_files: Option<usize>,

    /// Log level: {trace, debug, info, warn, error, critical} or
    /// <subsystem>=<level>,...
    #[arg(id = "remote.lit-debuglevel", long = "remote.lit-debuglevel")]
    #[serde(rename = "lit-debuglevel")]
    pub lit_debug_level: Option<String>,

    #[command(flatten)]
    pub lnd: RemoteLndLayer,
}

/// `--remote.lnd.*`: how to reach the remote node.
#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteLndLayer {
    /// The network the remote node runs on.
    #[arg(id = "remote.lnd.network", long = "remote.lnd.network")]
    pub network: Option<String>,

    /// The host:port the remote node listens for RPC connections on.
    #[arg(id = "remote.lnd.rpcserver", long = "remote.lnd.rpcserver", value_name = "HOST:PORT")]
    #[serde(rename = "rpcserver")]
    pub rpc_server: Option<String>,

    /// DEPRECATED: use macaroonpath. Directory containing all lnd macaroons.
    #[arg(id = "remote.lnd.macaroondir", long = "remote.lnd.macaroondir", value_name = "DIR")]
    #[serde(rename = "macaroondir")]
    pub macaroon_dir: Option<PathBuf>,

    /// Full path to the single macaroon to use. Cannot be combined with
    /// macaroondir.
    #[arg(id = "remote.lnd.macaroonpath", long = "remote.lnd.macaroonpath", value_name = "PATH")]
    #[serde(rename = "macaroonpath")]
    pub macaroon_path: Option<PathBuf>,

    /// The remote node's TLS certificate.
    #[arg(id = "remote.lnd.tlscertpath", long = "remote.lnd.tlscertpath", value_name = "PATH")]
    #[serde(rename = "tlscertpath")]
    pub tls_cert_path: Option<PathBuf>,
}

/// `--lnd.*`: the in-process node (integrated mode).
#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LndLayer {
    #[arg(id = "lnd.lnddir", long = "lnd.lnddir", value_name = "DIR")]
    #[serde(rename = "lnddir")]
    pub lnd_dir: Option<PathBuf>,

    #[arg(id = "lnd.tlscertpath", long = "lnd.tlscertpath", value_name = "PATH")]
    #[serde(rename = "tlscertpath")]
    pub tls_cert_path: Option<PathBuf>,

    #[arg(id = "lnd.tlskeypath", long = "lnd.tlskeypath", value_name = "PATH")]
    #[serde(rename = "tlskeypath")]
    pub tls_key_path: Option<PathBuf>,

    #[arg(id = "lnd.adminmacaroonpath", long = "lnd.adminmacaroonpath", value_name = "PATH")]
    #[serde(rename = "adminmacaroonpath")]
    pub admin_macaroon_path: Option<PathBuf>,

    #[arg(id = "lnd.logdir", long = "lnd.logdir", value_name = "DIR")]
    #[serde(rename = "logdir")]
    pub log_dir: Option<PathBuf>,

    #[arg(id = "lnd.maxlogfiles", long = "lnd.maxlogfiles")]
    #[serde(rename = "maxlogfiles")]
    pub max_log_files: Option<usize>,

    #[arg(id = "lnd.debuglevel", long = "lnd.debuglevel")]
    #[serde(rename = "debuglevel")]
    pub debug_level: Option<String>,

    /// Interface/port to listen for RPC connections on. May be repeated.
    #[arg(id = "lnd.rpclisten", long = "lnd.rpclisten", value_name = "HOST:PORT")]
    #[serde(rename = "rpclisten")]
    pub rpc_listeners: Vec<String>,

    #[command(flatten)]
    pub bitcoin: BitcoinLayer,
}

/// `--lnd.bitcoin.*` network selection.
#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BitcoinLayer {
    #[arg(id = "lnd.bitcoin.mainnet", long = "lnd.bitcoin.mainnet")]
    pub mainnet: bool,

    #[arg(id = "lnd.bitcoin.testnet", long = "lnd.bitcoin.testnet")]
    pub testnet: bool,

    #[arg(id = "lnd.bitcoin.regtest", long = "lnd.bitcoin.regtest")]
    pub regtest: bool,

    #[arg(id = "lnd.bitcoin.simnet", long = "lnd.bitcoin.simnet")]
    pub simnet: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopLayer {
    #[arg(id = "loop.loopdir", long = "loop.loopdir", value_name = "DIR")]
    #[serde(rename = "loopdir")]
    pub dir: Option<PathBuf>,

    #[arg(id = "loop.macaroonpath", long = "loop.macaroonpath", value_name = "PATH")]
    #[serde(rename = "macaroonpath")]
    pub macaroon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolLayer {
    #[arg(id = "pool.basedir", long = "pool.basedir", value_name = "DIR")]
    #[serde(rename = "basedir")]
    pub dir: Option<PathBuf>,

    #[arg(id = "pool.macaroonpath", long = "pool.macaroonpath", value_name = "PATH")]
    #[serde(rename = "macaroonpath")]
    pub macaroon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaradayLayer {
    #[arg(id = "faraday.faradaydir", long = "faraday.faradaydir", value_name = "DIR")]
    #[serde(rename = "faradaydir")]
    pub dir: Option<PathBuf>,

    #[arg(id = "faraday.macaroonpath", long = "faraday.macaroonpath", value_name = "PATH")]
    #[serde(rename = "macaroonpath")]
    pub macaroon_path: Option<PathBuf>,

    /// Connect faraday to a bitcoin backend for on-chain data.
    #[arg(id = "faraday.connect_bitcoin", long = "faraday.connect_bitcoin")]
    pub connect_bitcoin: bool,

    #[arg(id = "faraday.bitcoin.host", long = "faraday.bitcoin.host", value_name = "HOST:PORT")]
    #[serde(rename = "bitcoin.host")]
    pub bitcoin_host: Option<String>,
}

impl ConfigLayer {
    /// Parse command line arguments (including the program name).
    ///
    /// Help requests become [`ConfigError::RequestedExit`] carrying the
    /// rendered help text.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        ConfigLayer::try_parse_from(args).map_err(|e| match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                ConfigError::RequestedExit(e.render().to_string())
            }
            _ => {
                let rendered = e.to_string();
                let message = rendered
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches("error: ")
                    .to_string();
                ConfigError::ConfigSyntax {
                    source_name: "command line flags".into(),
                    message,
                }
            }
        })
    }

    /// Parse the contents of a config file.
    pub fn from_file_contents(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ConfigSyntax {
            source_name: format!("config file {}", path.display()),
            message: e.message().to_string(),
        })
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl RawConfig {
    /// Apply every value `layer` sets on top of this snapshot.
    ///
    /// Boolean flags can only switch a feature on, never off.
    pub fn overlay(mut self, layer: &ConfigLayer) -> Self {
        set(&mut self.https_listen, &layer.https_listen);
        set(&mut self.insecure_listen, &layer.insecure_listen);
        set(&mut self.ui_password, &layer.ui_password);
        set(&mut self.ui_password_file, &layer.ui_password_file);
        set(&mut self.ui_password_env, &layer.ui_password_env);
        self.lets_encrypt |= layer.lets_encrypt;
        set(&mut self.lets_encrypt_host, &layer.lets_encrypt_host);
        set(&mut self.lets_encrypt_dir, &layer.lets_encrypt_dir);
        set(&mut self.lets_encrypt_listen, &layer.lets_encrypt_listen);
        set(&mut self.lnd_mode, &layer.lnd_mode);
        set(&mut self.lit_dir, &layer.lit_dir);
        set(&mut self.config_file, &layer.config_file);

        let remote = &mut self.remote;
        set(&mut remote.lit_tls_cert_path, &layer.remote.lit_tls_cert_path);
        set(&mut remote.lit_tls_key_path, &layer.remote.lit_tls_key_path);
        set(&mut remote.lit_log_dir, &layer.remote.lit_log_dir);
        set(&mut remote.lit_max_log_files, &layer.remote.lit_max_log_files);
        set(&mut remote.lit_debug_level, &layer.remote.lit_debug_level);

        let remote_lnd = &mut remote.lnd;
        let layer_lnd = &layer.remote.lnd;
        set(&mut remote_lnd.network, &layer_lnd.network);
        set(&mut remote_lnd.rpc_server, &layer_lnd.rpc_server);
        set(&mut remote_lnd.macaroon_dir, &layer_lnd.macaroon_dir);
        if layer_lnd.macaroon_path.is_some() {
            remote_lnd.macaroon_path = layer_lnd.macaroon_path.clone();
        }
        set(&mut remote_lnd.tls_cert_path, &layer_lnd.tls_cert_path);

        let lnd = &mut self.lnd;
        set(&mut lnd.lnd_dir, &layer.lnd.lnd_dir);
        set(&mut lnd.tls_cert_path, &layer.lnd.tls_cert_path);
        set(&mut lnd.tls_key_path, &layer.lnd.tls_key_path);
        if layer.lnd.admin_macaroon_path.is_some() {
            lnd.admin_macaroon_path = layer.lnd.admin_macaroon_path.clone();
        }
        set(&mut lnd.log_dir, &layer.lnd.log_dir);
        set(&mut lnd.max_log_files, &layer.lnd.max_log_files);
        set(&mut lnd.debug_level, &layer.lnd.debug_level);
        if !layer.lnd.rpc_listeners.is_empty() {
            lnd.rpc_listeners = layer.lnd.rpc_listeners.clone();
        }
        lnd.bitcoin.mainnet |= layer.lnd.bitcoin.mainnet;
        lnd.bitcoin.testnet |= layer.lnd.bitcoin.testnet;
        lnd.bitcoin.regtest |= layer.lnd.bitcoin.regtest;
        lnd.bitcoin.simnet |= layer.lnd.bitcoin.simnet;

        set(&mut self.loop_.dir, &layer.loop_.dir);
        if layer.loop_.macaroon_path.is_some() {
            self.loop_.macaroon_path = layer.loop_.macaroon_path.clone();
        }
        set(&mut self.pool.dir, &layer.pool.dir);
        if layer.pool.macaroon_path.is_some() {
            self.pool.macaroon_path = layer.pool.macaroon_path.clone();
        }
        set(&mut self.faraday.daemon.dir, &layer.faraday.dir);
        if layer.faraday.macaroon_path.is_some() {
            self.faraday.daemon.macaroon_path = layer.faraday.macaroon_path.clone();
        }
        self.faraday.connect_bitcoin |= layer.faraday.connect_bitcoin;
        set(&mut self.faraday.bitcoin_host, &layer.faraday.bitcoin_host);

        self
    }
}
