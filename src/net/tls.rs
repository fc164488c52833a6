//! TLS provisioning for the external endpoint.
//!
//! # Responsibilities
//! - Pick the certificate source: Let's Encrypt, self-signed or the node's pair
//! - Widen the node's narrow cipher suite list by one HTTP/2 suite
//! - Produce an HTTP/2 capable `rustls::ServerConfig`
//! - Terminate TLS on top of the deferred listener
//!
//! # Design Decisions
//! - Handshakes run in their own tasks so a slow client never stalls accept
//! - Certificate files are written last, after every pre-check passed

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::aws_lc_rs::{self, cipher_suite};
use rustls::crypto::CryptoProvider;
use rustls::server::ResolvesServerCert;
use rustls::{CipherSuite, ServerConfig, SupportedCipherSuite};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::schema::TlsStrategy;
use crate::net::acme::{self, AcmeHandle};
use crate::net::certgen::{ensure_self_signed, load_cert_pair, CertPair};
use crate::net::listener::{Connection, DeferredListener, ListenerFailure, ObservedListener, PeerAddr};

/// Protocols offered during ALPN, in preference order.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for TLS provisioning.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed creating self-signed cert: {0}")]
    CertGenerationFailed(String),

    #[error("failed reading TLS server keys from {}: {reason}", path.display())]
    CertLoadFailed { path: PathBuf, reason: String },

    #[error("let's encrypt host name option is required for using let's encrypt")]
    MissingAcmeHost,

    #[error("can't configure h2 handling: {0}")]
    H2SetupFailed(String),

    #[error("let's encrypt setup failed: {0}")]
    AcmeSetup(String),
}

/// The node's default suite list: AEAD suites with ECDSA certificates only.
pub fn node_default_suites() -> Vec<SupportedCipherSuite> {
    vec![
        cipher_suite::TLS13_AES_128_GCM_SHA256,
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ]
}

/// Append the broadly supported RSA/AES-128-GCM suite some HTTP/2 clients
/// insist on.
pub fn with_compat_suite(mut suites: Vec<SupportedCipherSuite>) -> Vec<SupportedCipherSuite> {
    let compat = cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256;
    if !suites.iter().any(|s| s.suite() == compat.suite()) {
        suites.push(compat);
    }
    suites
}

/// TLS 1.2 suites HTTP/2 permits (RFC 7540 appendix A lists the rest).
const H2_APPROVED_TLS12: [CipherSuite; 6] = [
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// Check a suite list against HTTP/2's requirements.
///
/// Every TLS 1.2 suite must be an approved AEAD suite, and one of the
/// mandatory AES-128-GCM suites must be present.
pub fn check_http2_suites(suites: &[SupportedCipherSuite]) -> Result<(), TlsError> {
    for suite in suites {
        if let SupportedCipherSuite::Tls12(_) = suite {
            if !H2_APPROVED_TLS12.contains(&suite.suite()) {
                return Err(TlsError::H2SetupFailed(format!(
                    "cipher suite {:?} is not allowed with HTTP/2",
                    suite.suite()
                )));
            }
        }
    }

    let has_required = suites.iter().any(|s| {
        matches!(
            s.suite(),
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
                | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
        )
    });
    if !has_required {
        return Err(TlsError::H2SetupFailed(
            "cipher suites are missing an HTTP/2-required AES_128_GCM_SHA256 suite".into(),
        ));
    }
    Ok(())
}

/// Where the certificate presented to clients comes from.
pub enum Identity {
    /// A fixed pair loaded from disk.
    Static(CertPair),
    /// Chosen per handshake (Let's Encrypt).
    Dynamic(Arc<dyn ResolvesServerCert>),
}

/// Certificate material plus the suites it will be served with.
pub struct TlsMaterial {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub identity: Identity,
    pub cipher_suites: Vec<SupportedCipherSuite>,
}

impl TlsMaterial {
    fn from_files(cert_path: PathBuf, key_path: PathBuf) -> Result<Self, TlsError> {
        let pair = load_cert_pair(&cert_path, &key_path)?;
        Ok(Self {
            cert_path: Some(cert_path),
            key_path: Some(key_path),
            identity: Identity::Static(pair),
            cipher_suites: node_default_suites(),
        })
    }

    /// Build the HTTP/2 server configuration.
    pub fn into_http2_config(self) -> Result<ServerConfig, TlsError> {
        let suites = with_compat_suite(self.cipher_suites);
        check_http2_suites(&suites)?;

        let provider = CryptoProvider {
            cipher_suites: suites,
            ..aws_lc_rs::default_provider()
        };
        let builder = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| TlsError::H2SetupFailed(e.to_string()))?
            .with_no_client_auth();

        let mut config = match self.identity {
            Identity::Static(pair) => builder.with_single_cert(pair.certs, pair.key).map_err(|e| {
                TlsError::CertLoadFailed {
                    path: self.cert_path.clone().unwrap_or_default(),
                    reason: e.to_string(),
                }
            })?,
            Identity::Dynamic(resolver) => builder.with_cert_resolver(resolver),
        };
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }
}

/// A ready-to-serve TLS configuration.
#[derive(Debug)]
pub struct ProvisionedTls {
    pub server_config: Arc<ServerConfig>,
    /// Background Let's Encrypt tasks, when that strategy is active.
    pub acme: Option<AcmeHandle>,
}

/// Obtain the certificate for the external endpoint.
///
/// The Let's Encrypt strategy spawns background tasks and must be called
/// from within a tokio runtime.
pub fn provision(
    strategy: &TlsStrategy,
    shutdown: &broadcast::Sender<()>,
) -> Result<ProvisionedTls, TlsError> {
    let (material, acme) = match strategy {
        TlsStrategy::Acme {
            host,
            cache_dir,
            listen,
        } => {
            if host.trim().is_empty() {
                return Err(TlsError::MissingAcmeHost);
            }
            tracing::info!(host = %host, cache_dir = %cache_dir.display(), "Setting up Let's Encrypt");
            let (resolver, handle) = acme::start(host, cache_dir, listen, shutdown)?;
            let material = TlsMaterial {
                cert_path: None,
                key_path: None,
                identity: Identity::Dynamic(resolver),
                cipher_suites: node_default_suites(),
            };
            (material, Some(handle))
        }
        TlsStrategy::SelfSigned {
            cert_path,
            key_path,
        } => {
            ensure_self_signed(cert_path, key_path)?;
            (TlsMaterial::from_files(cert_path.clone(), key_path.clone())?, None)
        }
        TlsStrategy::Delegated {
            cert_path,
            key_path,
        } => (TlsMaterial::from_files(cert_path.clone(), key_path.clone())?, None),
    };

    Ok(ProvisionedTls {
        server_config: Arc::new(material.into_http2_config()?),
        acme,
    })
}

/// Terminates TLS on connections accepted by a [`DeferredListener`].
pub struct TlsListener {
    inner: DeferredListener,
    acceptor: TlsAcceptor,
    handshakes: JoinSet<Option<(TlsStream<Connection>, PeerAddr)>>,
}

impl TlsListener {
    pub fn new(inner: DeferredListener, config: Arc<ServerConfig>) -> Self {
        Self {
            inner,
            acceptor: TlsAcceptor::from(config),
            handshakes: JoinSet::new(),
        }
    }

    pub fn inner(&self) -> &DeferredListener {
        &self.inner
    }
}

async fn handshake(
    acceptor: TlsAcceptor,
    conn: Connection,
    peer: PeerAddr,
) -> Option<(TlsStream<Connection>, PeerAddr)> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(conn)).await {
        Ok(Ok(stream)) => Some((stream, peer)),
        Ok(Err(e)) => {
            tracing::debug!(peer_addr = %peer, error = %e, "TLS handshake failed");
            None
        }
        Err(_) => {
            tracing::debug!(peer_addr = %peer, "TLS handshake timed out");
            None
        }
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<Connection>;
    type Addr = PeerAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            tokio::select! {
                (conn, peer) = axum::serve::Listener::accept(&mut self.inner) => {
                    self.handshakes.spawn(handshake(self.acceptor.clone(), conn, peer));
                }
                Some(done) = self.handshakes.join_next(), if !self.handshakes.is_empty() => {
                    if let Ok(Some(accepted)) = done {
                        return accepted;
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        axum::serve::Listener::local_addr(&self.inner)
    }
}

impl ObservedListener for TlsListener {
    fn failure(&self) -> ListenerFailure {
        self.inner.failure()
    }
}
