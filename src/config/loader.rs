//! Configuration loading: defaults, then the config file, then the command line.
//!
//! Each stage produces a new [`RawConfig`] snapshot, so precedence is fixed
//! by the order of the pipeline rather than by how often a parser runs.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defaults::{self, Defaults};
use crate::config::error::ConfigError;
use crate::config::layer::ConfigLayer;
use crate::config::paths::clean_and_expand_path;
use crate::config::schema::RawConfig;

/// The merged configuration plus a warning to emit once logging is up.
#[derive(Debug)]
pub struct Layered {
    pub config: RawConfig,
    /// Set when the config file could not be read.
    pub deferred: Option<ConfigError>,
}

/// Parse the command line. A version request ends resolution early.
pub fn parse_args<I, T>(args: I) -> Result<ConfigLayer, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let layer = ConfigLayer::from_args(args)?;
    if layer.show_version {
        return Err(ConfigError::RequestedExit(version_string()));
    }
    Ok(layer)
}

pub fn version_string() -> String {
    format!("litd version {}", env!("CARGO_PKG_VERSION"))
}

/// Where to read the config file from.
///
/// An operator who moved the base directory but kept the default config
/// file path means the `lit.conf` inside the new base directory.
pub fn locate_config_file(defaults: &Defaults, args: &ConfigLayer) -> PathBuf {
    let lit_dir = args
        .lit_dir
        .as_ref()
        .map(clean_and_expand_path)
        .unwrap_or_else(|| clean_and_expand_path(&defaults.lit_dir));
    let config_file = args
        .config_file
        .as_ref()
        .map(clean_and_expand_path)
        .unwrap_or_else(|| clean_and_expand_path(defaults.config_file()));

    if lit_dir != clean_and_expand_path(&defaults.lit_dir)
        && config_file == clean_and_expand_path(defaults.config_file())
    {
        return lit_dir.join(defaults::DEFAULT_CONFIG_FILENAME);
    }
    config_file
}

/// Read the config file at `path`.
///
/// A file that cannot be read yields an empty layer and a deferred
/// [`ConfigError::ConfigFileAbsent`]; a file that cannot be parsed is fatal.
pub fn load_config_file(path: &Path) -> Result<(ConfigLayer, Option<ConfigError>), ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            let absent = ConfigError::ConfigFileAbsent {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
            return Ok((ConfigLayer::default(), Some(absent)));
        }
    };

    let layer = ConfigLayer::from_file_contents(&contents, path)?;
    Ok((layer, None))
}

/// Run the three-stage pipeline over `argv` (program name first).
pub fn load_layers<I, T>(defaults: &Defaults, argv: I) -> Result<Layered, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = parse_args(argv)?;
    let config_path = locate_config_file(defaults, &args);

    let mut base = RawConfig::from_defaults(defaults);
    if let Some(lit_dir) = &args.lit_dir {
        base.lit_dir = lit_dir.clone();
    }
    let base = base.rebase_on_lit_dir(defaults);

    let (file, deferred) = load_config_file(&config_path)?;
    let mut config = base.overlay(&file).overlay(&args);
    config.config_file = config_path;

    tracing::trace!(
        config_file = %config.config_file.display(),
        file_read = deferred.is_none(),
        "Configuration layers merged"
    );

    Ok(Layered { config, deferred })
}

impl RawConfig {
    /// Move litd's own files under a custom `self.lit_dir`.
    ///
    /// The remote-mode cert, key and log dir always follow the lit dir,
    /// overriding any explicit value. The Let's Encrypt dir moves only
    /// while it is still at its default.
    pub fn rebase_on_lit_dir(mut self, defaults: &Defaults) -> Self {
        let lit_dir = clean_and_expand_path(&self.lit_dir);
        if lit_dir == clean_and_expand_path(&defaults.lit_dir) {
            return self;
        }

        self.remote.lit_tls_cert_path = lit_dir.join(defaults::DEFAULT_TLS_CERT_FILENAME);
        self.remote.lit_tls_key_path = lit_dir.join(defaults::DEFAULT_TLS_KEY_FILENAME);
        self.remote.lit_log_dir = lit_dir.join(defaults::DEFAULT_LOG_DIRNAME);

        if clean_and_expand_path(&self.lets_encrypt_dir)
            == clean_and_expand_path(defaults.lets_encrypt_dir())
        {
            self.lets_encrypt_dir = lit_dir.join(defaults::DEFAULT_LETS_ENCRYPT_SUBDIR);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Defaults {
        Defaults::rooted_at(Path::new("/home/carol"))
    }

    #[test]
    fn config_file_follows_lit_dir() {
        let d = defaults();
        let args = parse_args(["litd", "--lit-dir=/srv/lit"]).unwrap();
        assert_eq!(locate_config_file(&d, &args), PathBuf::from("/srv/lit/lit.conf"));

        let args = parse_args(["litd", "--lit-dir=/srv/lit", "--configfile=/etc/lit.conf"]).unwrap();
        assert_eq!(locate_config_file(&d, &args), PathBuf::from("/etc/lit.conf"));

        let args = parse_args(["litd"]).unwrap();
        assert_eq!(locate_config_file(&d, &args), d.config_file());
    }

    #[test]
    fn version_is_a_requested_exit() {
        let err = parse_args(["litd", "--version"]).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("litd version"));
    }

    #[test]
    fn missing_file_is_deferred() {
        let (layer, deferred) = load_config_file(Path::new("/nonexistent/lit.conf")).unwrap();
        assert_eq!(layer, ConfigLayer::default());
        assert!(matches!(deferred, Some(ConfigError::ConfigFileAbsent { .. })));
    }

    #[test]
    fn rebase_overrides_litd_files_but_keeps_letsencrypt() {
        let d = defaults();
        let mut raw = RawConfig::from_defaults(&d);
        raw.lit_dir = PathBuf::from("/srv/lit");
        raw.remote.lit_tls_key_path = PathBuf::from("/keys/tls.key");
        raw.remote.lit_log_dir = PathBuf::from("/var/log/lit");
        raw.lets_encrypt_dir = PathBuf::from("/acme");

        let raw = raw.rebase_on_lit_dir(&d);
        assert_eq!(raw.remote.lit_tls_cert_path, PathBuf::from("/srv/lit/tls.cert"));
        assert_eq!(raw.remote.lit_tls_key_path, PathBuf::from("/srv/lit/tls.key"));
        assert_eq!(raw.remote.lit_log_dir, PathBuf::from("/srv/lit/logs"));
        assert_eq!(raw.lets_encrypt_dir, PathBuf::from("/acme"));
    }

    #[test]
    fn rebase_moves_default_letsencrypt_dir() {
        let d = defaults();
        let mut raw = RawConfig::from_defaults(&d);
        raw.lit_dir = PathBuf::from("/srv/lit");

        let raw = raw.rebase_on_lit_dir(&d);
        assert_eq!(raw.lets_encrypt_dir, PathBuf::from("/srv/lit/letsencrypt"));
    }

    #[test]
    fn rebase_is_a_no_op_at_the_default_lit_dir() {
        let d = defaults();
        let mut raw = RawConfig::from_defaults(&d);
        raw.remote.lit_tls_cert_path = PathBuf::from("/certs/my.cert");

        let raw = raw.rebase_on_lit_dir(&d);
        assert_eq!(raw.remote.lit_tls_cert_path, PathBuf::from("/certs/my.cert"));
    }
}
