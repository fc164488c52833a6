//! Compiled-in defaults.
//!
//! Platform dependent locations (the application data directories of litd
//! and lnd) are computed once by [`Defaults::detect`] and threaded through
//! the resolution pipeline instead of living in module-level statics.

use std::path::{Path, PathBuf};

pub const DEFAULT_HTTPS_LISTEN: &str = "127.0.0.1:8443";
pub const UI_PASSWORD_MIN_LENGTH: usize = 8;

pub const DEFAULT_CONFIG_FILENAME: &str = "lit.conf";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MAX_LOG_FILES: usize = 3;
pub const DEFAULT_LOG_DIRNAME: &str = "logs";
pub const DEFAULT_LOG_FILENAME: &str = "litd.log";

pub const DEFAULT_LETS_ENCRYPT_SUBDIR: &str = "letsencrypt";
pub const DEFAULT_LETS_ENCRYPT_LISTEN: &str = ":80";
pub const SELF_SIGNED_CERT_ORGANIZATION: &str = "litd autogenerated cert";

pub const DEFAULT_TLS_CERT_FILENAME: &str = "tls.cert";
pub const DEFAULT_TLS_KEY_FILENAME: &str = "tls.key";

pub const DEFAULT_NETWORK: &str = "mainnet";
pub const DEFAULT_REMOTE_LND_RPC_SERVER: &str = "localhost:10009";
pub const DEFAULT_LND_RPC_PORT: u16 = 10009;
pub const DEFAULT_LND_MACAROON: &str = "admin.macaroon";
pub const DEFAULT_LND_MODE: &str = "remote";
pub const LND_LOG_FILENAME: &str = "lnd.log";

pub const LOOP_MACAROON_FILENAME: &str = "loop.macaroon";
pub const POOL_MACAROON_FILENAME: &str = "pool.macaroon";
pub const FARADAY_MACAROON_FILENAME: &str = "faraday.macaroon";

const LND_DATA_SUBDIR: &str = "data";
const LND_CHAIN_SUBDIR: &str = "chain";
pub const LND_CHAIN: &str = "bitcoin";
const LND_LOG_SUBDIR: &str = "logs";

/// Default locations derived from the platform's application data dirs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    /// litd's own base directory (`~/.lit` on Linux).
    pub lit_dir: PathBuf,
    /// The node's base directory (`~/.lnd` on Linux).
    pub lnd_dir: PathBuf,
    pub loop_dir: PathBuf,
    pub pool_dir: PathBuf,
    pub faraday_dir: PathBuf,
}

impl Defaults {
    /// Inspect the environment for the current user's data directories.
    pub fn detect() -> Self {
        Self {
            lit_dir: app_data_dir("lit"),
            lnd_dir: app_data_dir("lnd"),
            loop_dir: app_data_dir("loop"),
            pool_dir: app_data_dir("pool"),
            faraday_dir: app_data_dir("faraday"),
        }
    }

    /// Defaults rooted under an arbitrary home directory.
    pub fn rooted_at(home: &Path) -> Self {
        Self {
            lit_dir: home.join(".lit"),
            lnd_dir: home.join(".lnd"),
            loop_dir: home.join(".loop"),
            pool_dir: home.join(".pool"),
            faraday_dir: home.join(".faraday"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.lit_dir.join(DEFAULT_CONFIG_FILENAME)
    }

    pub fn tls_cert_path(&self) -> PathBuf {
        self.lit_dir.join(DEFAULT_TLS_CERT_FILENAME)
    }

    pub fn tls_key_path(&self) -> PathBuf {
        self.lit_dir.join(DEFAULT_TLS_KEY_FILENAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.lit_dir.join(DEFAULT_LOG_DIRNAME)
    }

    pub fn lets_encrypt_dir(&self) -> PathBuf {
        self.lit_dir.join(DEFAULT_LETS_ENCRYPT_SUBDIR)
    }

    pub fn lnd_tls_cert_path(&self) -> PathBuf {
        self.lnd_dir.join(DEFAULT_TLS_CERT_FILENAME)
    }

    pub fn lnd_tls_key_path(&self) -> PathBuf {
        self.lnd_dir.join(DEFAULT_TLS_KEY_FILENAME)
    }

    pub fn lnd_log_dir(&self) -> PathBuf {
        self.lnd_dir.join(LND_LOG_SUBDIR)
    }

    /// Directory in which lnd keeps the macaroons of `network`.
    pub fn lnd_macaroon_dir(&self, network: &str) -> PathBuf {
        lnd_network_dir(&self.lnd_dir, network)
    }

    /// The macaroon directory used when the operator sets nothing.
    pub fn remote_macaroon_dir(&self) -> PathBuf {
        self.lnd_macaroon_dir(DEFAULT_NETWORK)
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::detect()
    }
}

/// `<lnd_dir>/data/chain/bitcoin/<network>`, where lnd keeps its macaroons.
pub fn lnd_network_dir(lnd_dir: &Path, network: &str) -> PathBuf {
    lnd_dir
        .join(LND_DATA_SUBDIR)
        .join(LND_CHAIN_SUBDIR)
        .join(LND_CHAIN)
        .join(network)
}

/// Per-OS application data directory, e.g. `~/.lit` on Linux,
/// `~/Library/Application Support/Lit` on macOS and
/// `%LOCALAPPDATA%\Lit` on Windows.
fn app_data_dir(app: &str) -> PathBuf {
    let mut title = app.to_string();
    if let Some(first) = title.get_mut(0..1) {
        first.make_ascii_uppercase();
    }

    if cfg!(target_os = "windows") {
        if let Some(dir) = dirs::data_local_dir() {
            return dir.join(title);
        }
    } else if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library").join("Application Support").join(title);
        }
    } else if let Some(home) = dirs::home_dir() {
        return home.join(format!(".{}", app));
    }

    PathBuf::from(".")
}
