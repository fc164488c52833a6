//! End-to-end configuration resolution: argv and lit.conf to RuntimeConfig.

mod common;

use std::fs;

use common::{argv, no_env, sandbox, AcceptingNode, RecordingSubDaemons, PASSWORD};
use litd_gateway::config::error::ConfigError;
use litd_gateway::config::{
    load_and_validate, Defaults, LndMode, Network, Resolved, TlsStrategy, Validators,
};

fn resolve(defaults: &Defaults, args: &[&str]) -> Result<Resolved, ConfigError> {
    load_and_validate(defaults, argv(args), Validators::builtin(), no_env)
}

#[test]
fn remote_mode_with_defaults() {
    let (_tmp, defaults) = sandbox();
    let resolved = resolve(&defaults, &["--uipassword", PASSWORD]).unwrap();
    let config = resolved.config;

    assert_eq!(config.network, Network::Mainnet);
    assert!(matches!(config.mode, LndMode::Remote(_)));
    assert_eq!(
        config.tls,
        TlsStrategy::SelfSigned {
            cert_path: defaults.tls_cert_path(),
            key_path: defaults.tls_key_path(),
        }
    );
    assert_eq!(config.logging.dir, defaults.log_dir().join("mainnet"));
    assert_eq!(config.logging.filename, "litd.log");
    assert!(config.insecure_listen.is_none());
    assert!(defaults.lit_dir.is_dir());

    let lnd = config.lnd_connect_params();
    assert_eq!(lnd.rpc_server, "localhost:10009");
    assert_eq!(
        lnd.macaroon_path,
        defaults.remote_macaroon_dir().join("admin.macaroon")
    );
}

#[test]
fn missing_config_file_is_deferred_not_fatal() {
    let (_tmp, defaults) = sandbox();
    let resolved = resolve(&defaults, &["--uipassword", PASSWORD]).unwrap();

    let warning = resolved.deferred.expect("absence should be reported");
    assert!(matches!(warning, ConfigError::ConfigFileAbsent { .. }));
    assert!(!warning.is_fatal());
}

#[test]
fn malformed_config_file_is_fatal() {
    let (_tmp, defaults) = sandbox();
    fs::create_dir_all(&defaults.lit_dir).unwrap();
    fs::write(defaults.config_file(), "uipassword = [unterminated").unwrap();

    let err = resolve(&defaults, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigSyntax { .. }));
    assert!(err.is_fatal());
}

#[test]
fn command_line_beats_config_file() {
    let (_tmp, defaults) = sandbox();
    fs::create_dir_all(&defaults.lit_dir).unwrap();
    fs::write(
        defaults.config_file(),
        "uipassword = \"from-the-config-file\"\n\n[remote.lnd]\nnetwork = \"testnet\"\n",
    )
    .unwrap();

    let resolved = resolve(&defaults, &["--remote.lnd.network", "regtest"]).unwrap();
    assert!(resolved.deferred.is_none());
    assert_eq!(resolved.config.network, Network::Regtest);
    assert_eq!(resolved.config.ui_password.expose(), "from-the-config-file");
}

#[test]
fn custom_lit_dir_overrides_explicit_litd_files() {
    let (tmp, defaults) = sandbox();
    let custom = tmp.path().join("newlit");
    let cert = tmp.path().join("certs").join("my.cert");
    let logs = tmp.path().join("mylogs");

    let resolved = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--lit-dir",
            custom.to_str().unwrap(),
            "--remote.lit-tlscertpath",
            cert.to_str().unwrap(),
            "--remote.lit-logdir",
            logs.to_str().unwrap(),
        ],
    )
    .unwrap();
    let config = resolved.config;

    assert_eq!(
        config.tls,
        TlsStrategy::SelfSigned {
            cert_path: custom.join("tls.cert"),
            key_path: custom.join("tls.key"),
        }
    );
    let LndMode::Remote(remote) = &config.mode else {
        panic!("expected remote mode");
    };
    assert_eq!(remote.lit_log_dir, custom.join("logs"));
    assert_eq!(config.logging.dir, custom.join("logs").join("mainnet"));
    assert!(!cert.parent().unwrap().exists());
}

#[test]
fn config_file_is_read_from_custom_lit_dir() {
    let (tmp, defaults) = sandbox();
    let custom = tmp.path().join("elsewhere");
    fs::create_dir_all(&custom).unwrap();
    fs::write(custom.join("lit.conf"), format!("uipassword = \"{PASSWORD}\"\n")).unwrap();

    let resolved = resolve(&defaults, &["--lit-dir", custom.to_str().unwrap()]).unwrap();
    let config = resolved.config;

    assert!(resolved.deferred.is_none());
    assert_eq!(config.lit_dir, custom);
    assert_eq!(
        config.tls,
        TlsStrategy::SelfSigned {
            cert_path: custom.join("tls.cert"),
            key_path: custom.join("tls.key"),
        }
    );
    assert_eq!(config.logging.dir, custom.join("logs").join("mainnet"));
}

#[test]
fn version_flag_requests_exit() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--version"]).unwrap_err();
    match err {
        ConfigError::RequestedExit(text) => assert!(text.starts_with("litd version ")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_mode_is_rejected() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--uipassword", PASSWORD, "--lnd-mode", "hybrid"]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMode(mode) if mode == "hybrid"));
}

#[test]
fn unknown_remote_network_is_rejected() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(
        &defaults,
        &["--uipassword", PASSWORD, "--remote.lnd.network", "signet"],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidNetwork(_)));
}

#[test]
fn remote_network_moves_default_macaroon_dir() {
    let (_tmp, defaults) = sandbox();
    let resolved = resolve(
        &defaults,
        &["--uipassword", PASSWORD, "--remote.lnd.network", "testnet"],
    )
    .unwrap();

    let lnd = resolved.config.lnd_connect_params();
    assert_eq!(lnd.network, Network::Testnet);
    assert_eq!(
        lnd.macaroon_path,
        defaults.lnd_macaroon_dir("testnet").join("admin.macaroon")
    );
}

#[test]
fn custom_macaroon_dir_is_kept_on_network_change() {
    let (tmp, defaults) = sandbox();
    let dir = tmp.path().join("macaroons");
    let resolved = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--remote.lnd.network",
            "testnet",
            "--remote.lnd.macaroondir",
            dir.to_str().unwrap(),
        ],
    )
    .unwrap();

    let lnd = resolved.config.lnd_connect_params();
    assert_eq!(lnd.macaroon_path, dir.join("admin.macaroon"));
}

#[test]
fn macaroon_dir_and_path_conflict() {
    let (tmp, defaults) = sandbox();
    let dir = tmp.path().join("macaroons");
    let path = tmp.path().join("custom.macaroon");
    let err = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--remote.lnd.macaroondir",
            dir.to_str().unwrap(),
            "--remote.lnd.macaroonpath",
            path.to_str().unwrap(),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::ConflictingMacaroonConfig));
}

#[test]
fn macaroon_conflict_is_checked_in_integrated_mode_too() {
    let (tmp, defaults) = sandbox();
    let dir = tmp.path().join("macaroons");
    let path = tmp.path().join("custom.macaroon");
    let err = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--lnd-mode",
            "integrated",
            "--lnd.bitcoin.mainnet",
            "--remote.lnd.macaroondir",
            dir.to_str().unwrap(),
            "--remote.lnd.macaroonpath",
            path.to_str().unwrap(),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::ConflictingMacaroonConfig));
}

#[test]
fn explicit_macaroon_path_wins() {
    let (tmp, defaults) = sandbox();
    let path = tmp.path().join("custom.macaroon");
    let resolved = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--remote.lnd.macaroonpath",
            path.to_str().unwrap(),
        ],
    )
    .unwrap();
    assert_eq!(resolved.config.lnd_connect_params().macaroon_path, path);
}

#[test]
fn password_is_required() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::NoCredentialConfigured));
}

#[test]
fn password_length_threshold() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--uipassword", "1234567"]).unwrap_err();
    assert!(matches!(err, ConfigError::CredentialTooWeak { min_len: 8 }));

    let resolved = resolve(&defaults, &["--uipassword", "12345678"]).unwrap();
    assert_eq!(resolved.config.ui_password.expose(), "12345678");
}

#[test]
fn password_whitespace_does_not_count() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--uipassword", "  short  "]).unwrap_err();
    assert!(matches!(err, ConfigError::CredentialTooWeak { .. }));
}

#[test]
fn password_sources_in_priority_order() {
    let (tmp, defaults) = sandbox();
    let file = tmp.path().join("password");
    fs::write(&file, "from-the-password-file\n").unwrap();
    let env = |name: &str| (name == "LIT_PW").then(|| "from-the-environment".to_string());

    let both = argv(&[
        "--uipassword_file",
        file.to_str().unwrap(),
        "--uipassword_env",
        "LIT_PW",
    ]);
    let resolved = load_and_validate(&defaults, both, Validators::builtin(), env).unwrap();
    assert_eq!(resolved.config.ui_password.expose(), "from-the-password-file");

    let env_only = argv(&["--uipassword_env", "LIT_PW"]);
    let resolved = load_and_validate(&defaults, env_only, Validators::builtin(), env).unwrap();
    assert_eq!(resolved.config.ui_password.expose(), "from-the-environment");

    let direct = argv(&["--uipassword", PASSWORD, "--uipassword_env", "LIT_PW"]);
    let resolved = load_and_validate(&defaults, direct, Validators::builtin(), env).unwrap();
    assert_eq!(resolved.config.ui_password.expose(), PASSWORD);
}

#[test]
fn unreadable_password_file_is_fatal() {
    let (tmp, defaults) = sandbox();
    let missing = tmp.path().join("no-such-file");
    let err = resolve(&defaults, &["--uipassword_file", missing.to_str().unwrap()]).unwrap_err();
    assert!(matches!(err, ConfigError::FileUnreadable { path, .. } if path == missing));
}

#[test]
fn empty_password_env_var_is_fatal() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--uipassword_env", "LIT_UNSET"]).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarEmpty(var) if var == "LIT_UNSET"));
}

#[test]
fn lets_encrypt_needs_a_host() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(&defaults, &["--uipassword", PASSWORD, "--letsencrypt"]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingAcmeHost));
}

#[test]
fn lets_encrypt_strategy_and_cache_dir() {
    let (_tmp, defaults) = sandbox();
    let resolved = resolve(
        &defaults,
        &[
            "--uipassword",
            PASSWORD,
            "--letsencrypt",
            "--letsencrypthost",
            "lit.example.com",
        ],
    )
    .unwrap();

    match resolved.config.tls {
        TlsStrategy::Acme {
            host,
            cache_dir,
            listen,
        } => {
            assert_eq!(host, "lit.example.com");
            assert_eq!(cache_dir, defaults.lets_encrypt_dir());
            assert_eq!(listen, ":80");
            assert!(cache_dir.is_dir());
        }
        other => panic!("unexpected strategy: {other:?}"),
    }
}

#[test]
fn insecure_listener_is_optional() {
    let (_tmp, defaults) = sandbox();
    let resolved = resolve(
        &defaults,
        &["--uipassword", PASSWORD, "--insecure-httplisten", "127.0.0.1:8080"],
    )
    .unwrap();
    let addr = resolved.config.insecure_listen.expect("listener configured");
    assert_eq!(addr.to_string(), "127.0.0.1:8080");
}

#[test]
fn malformed_https_listen_is_rejected() {
    let (_tmp, defaults) = sandbox();
    let err = resolve(
        &defaults,
        &["--uipassword", PASSWORD, "--httpslisten", "not an address:port:x"],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidListenAddress {
            field: "httpslisten",
            ..
        }
    ));
}

#[test]
fn integrated_mode_needs_a_network() {
    let (_tmp, defaults) = sandbox();
    let node = AcceptingNode::default();
    let subdaemons = RecordingSubDaemons::default();
    let validators = Validators {
        node: &node,
        subdaemons: &subdaemons,
    };

    let args = argv(&["--uipassword", PASSWORD, "--lnd-mode", "integrated"]);
    let err = load_and_validate(&defaults, args, validators, no_env).unwrap_err();
    assert!(matches!(err, ConfigError::NoNetworkSelected));
    assert_eq!(node.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(subdaemons.seen().is_empty());
}

#[test]
fn integrated_mode_rejects_two_listeners() {
    let (_tmp, defaults) = sandbox();
    let node = AcceptingNode::default();
    let subdaemons = RecordingSubDaemons::default();
    let validators = Validators {
        node: &node,
        subdaemons: &subdaemons,
    };

    let args = argv(&[
        "--uipassword",
        PASSWORD,
        "--lnd-mode",
        "integrated",
        "--lnd.bitcoin.testnet",
        "--lnd.rpclisten",
        "127.0.0.1:10009",
        "--lnd.rpclisten",
        "127.0.0.1:10010",
    ]);
    let err = load_and_validate(&defaults, args, validators, no_env).unwrap_err();
    assert!(matches!(err, ConfigError::TooManyListeners(2)));
    assert!(subdaemons.seen().is_empty());
}

#[test]
fn integrated_mode_with_one_listener_reaches_subdaemons() {
    let (_tmp, defaults) = sandbox();
    let node = AcceptingNode::default();
    let subdaemons = RecordingSubDaemons::default();
    let validators = Validators {
        node: &node,
        subdaemons: &subdaemons,
    };

    let args = argv(&[
        "--uipassword",
        PASSWORD,
        "--lnd-mode",
        "integrated",
        "--lnd.bitcoin.testnet",
        "--lnd.rpclisten",
        "0.0.0.0:10009",
    ]);
    let resolved = load_and_validate(&defaults, args, validators, no_env).unwrap();
    let config = resolved.config;

    assert_eq!(subdaemons.seen(), vec!["loop", "pool", "faraday"]);
    assert_eq!(config.network, Network::Testnet);
    assert_eq!(config.subdaemons.loop_.network, "testnet");
    assert_eq!(config.subdaemons.faraday.daemon.network, "testnet");
    assert!(matches!(config.tls, TlsStrategy::Delegated { .. }));
    assert_eq!(
        config.logging.dir,
        defaults.lnd_log_dir().join("bitcoin").join("testnet")
    );
    assert_eq!(config.logging.filename, "lnd.log");

    let lnd = config.lnd_connect_params();
    assert_eq!(lnd.rpc_server, "127.0.0.1:10009");
    assert_eq!(
        lnd.macaroon_path,
        defaults.lnd_macaroon_dir("testnet").join("admin.macaroon")
    );
}

#[test]
fn integrated_mode_with_no_listener_is_accepted() {
    let (_tmp, defaults) = sandbox();
    let args = argv(&[
        "--uipassword",
        PASSWORD,
        "--lnd-mode",
        "integrated",
        "--lnd.bitcoin.regtest",
    ]);
    let resolved = load_and_validate(&defaults, args, Validators::builtin(), no_env).unwrap();

    match &resolved.config.mode {
        LndMode::Integrated(lnd) => {
            assert_eq!(lnd.rpc_listeners.len(), 1);
            assert!(lnd.rpc_listeners[0].ends_with(":10009"));
        }
        other => panic!("unexpected mode: {other:?}"),
    }
    assert_eq!(resolved.config.subdaemons.pool.network, "regtest");
}
