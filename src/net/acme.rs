//! Let's Encrypt certificates via the ACME HTTP-01 challenge.
//!
//! # Responsibilities
//! - Serve challenge tokens on the challenge listener (default `:80`)
//! - Hand the cached certificate to every handshake for the allowed host
//! - Obtain or renew the certificate lazily, from a background issuer task
//!
//! # Design Decisions
//! - The rustls resolver is synchronous; it only wakes the issuer and
//!   serves whatever is cached, so the first handshakes fail until the
//!   certificate arrives
//! - Both tasks are spawned with handles and stop on shutdown
//! - A challenge listener that fails to bind is logged, not fatal: cached
//!   certificates can still be served

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, LetsEncrypt,
    NewAccount, NewOrder, OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::config::paths::make_directories;
use crate::net::addr::ListenAddress;
use crate::net::tls::TlsError;

/// Renew once a certificate is this old (Let's Encrypt issues for 90 days).
const RENEW_AFTER: Duration = Duration::from_secs(60 * 24 * 60 * 60);
/// Wait this long after a failed order before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_ATTEMPTS: usize = 30;
const ACCOUNT_FILE: &str = "acme_account.json";

/// Errors from the ACME exchange.
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("acme protocol error: {0}")]
    Protocol(#[from] instant_acme::Error),

    #[error("certificate request failed: {0}")]
    Csr(#[from] rcgen::Error),

    #[error("cache {}: {reason}", path.display())]
    Cache { path: PathBuf, reason: String },

    #[error("order failed: {0}")]
    Order(String),
}

/// Pending HTTP-01 tokens and their key authorizations.
pub type ChallengeStore = Arc<DashMap<String, String>>;

struct Cached {
    key: Arc<CertifiedKey>,
    renew_at: SystemTime,
}

/// Certificate resolver handed to rustls.
pub struct AcmeResolver {
    host: String,
    current: ArcSwapOption<Cached>,
    wake: Arc<Notify>,
}

impl std::fmt::Debug for AcmeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeResolver")
            .field("host", &self.host)
            .field("cached", &self.current.load().is_some())
            .finish()
    }
}

impl AcmeResolver {
    fn new(host: &str, wake: Arc<Notify>) -> Self {
        Self {
            host: host.to_string(),
            current: ArcSwapOption::empty(),
            wake,
        }
    }

    fn needs_certificate(&self) -> bool {
        match &*self.current.load() {
            Some(cached) => SystemTime::now() >= cached.renew_at,
            None => true,
        }
    }
}

impl ResolvesServerCert for AcmeResolver {
    fn resolve(&self, hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let allowed = hello
            .server_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.host));
        if !allowed {
            tracing::debug!(server_name = ?hello.server_name(), "Rejecting handshake for unknown host");
            return None;
        }

        if self.needs_certificate() {
            self.wake.notify_one();
        }
        self.current.load().as_ref().map(|cached| Arc::clone(&cached.key))
    }
}

/// Obtains, caches and renews the certificate for one host.
pub struct AcmeManager {
    host: String,
    cache_dir: PathBuf,
    directory_url: String,
    challenges: ChallengeStore,
    resolver: Arc<AcmeResolver>,
    wake: Arc<Notify>,
}

impl AcmeManager {
    pub fn new(host: &str, cache_dir: &Path, directory_url: &str) -> Self {
        let wake = Arc::new(Notify::new());
        Self {
            host: host.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            directory_url: directory_url.to_string(),
            challenges: Arc::new(DashMap::new()),
            resolver: Arc::new(AcmeResolver::new(host, Arc::clone(&wake))),
            wake,
        }
    }

    pub fn resolver(&self) -> Arc<AcmeResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn challenges(&self) -> ChallengeStore {
        Arc::clone(&self.challenges)
    }

    fn cert_cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.host)
    }

    fn cache_err(path: &Path, e: impl std::fmt::Display) -> AcmeError {
        AcmeError::Cache {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }

    /// Load the cached certificate into the resolver. Returns whether one
    /// was found.
    pub fn load_cached(&self) -> Result<bool, AcmeError> {
        let path = self.cert_cache_path();
        let pem = match fs::read(&path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Self::cache_err(&path, e)),
        };
        let issued = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| Self::cache_err(&path, e))?;

        let key = certified_key_from_pem(&pem).map_err(|e| Self::cache_err(&path, e))?;
        self.resolver.current.store(Some(Arc::new(Cached {
            key: Arc::new(key),
            renew_at: issued + RENEW_AFTER,
        })));
        tracing::info!(host = %self.host, path = %path.display(), "Loaded cached certificate");
        Ok(true)
    }

    async fn account(&self) -> Result<Account, AcmeError> {
        let path = self.cache_dir.join(ACCOUNT_FILE);
        if let Ok(json) = fs::read(&path) {
            let credentials: AccountCredentials =
                serde_json::from_slice(&json).map_err(|e| Self::cache_err(&path, e))?;
            return Ok(Account::from_credentials(credentials).await?);
        }

        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &[],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await?;
        let json = serde_json::to_vec(&credentials).map_err(|e| Self::cache_err(&path, e))?;
        write_private(&path, &json).map_err(|e| Self::cache_err(&path, e))?;
        tracing::info!(path = %path.display(), "Registered ACME account");
        Ok(account)
    }

    /// Run one order for the host and cache the issued certificate.
    pub async fn obtain(&self) -> Result<(), AcmeError> {
        let account = self.account().await?;
        let identifiers = [Identifier::Dns(self.host.clone())];
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        let mut tokens = Vec::new();
        for authz in order.authorizations().await? {
            if authz.status != AuthorizationStatus::Pending {
                continue;
            }
            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Http01)
                .ok_or_else(|| AcmeError::Order("no http-01 challenge offered".into()))?;

            let key_auth = order.key_authorization(challenge);
            self.challenges
                .insert(challenge.token.clone(), key_auth.as_str().to_string());
            tokens.push(challenge.token.clone());
            order.set_challenge_ready(&challenge.url).await?;
        }

        let result = self.finish_order(&mut order).await;
        for token in tokens {
            self.challenges.remove(&token);
        }
        result
    }

    async fn finish_order(&self, order: &mut instant_acme::Order) -> Result<(), AcmeError> {
        let mut status = order.refresh().await?.status;
        for _ in 0..POLL_ATTEMPTS {
            if matches!(status, OrderStatus::Ready | OrderStatus::Invalid | OrderStatus::Valid) {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            status = order.refresh().await?.status;
        }
        check_finalizable(status, &self.host)?;

        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(vec![self.host.clone()])?;
        params.distinguished_name = DistinguishedName::new();
        let csr = params.serialize_request(&key)?;
        order.finalize(csr.der()).await?;

        let mut chain = None;
        for _ in 0..POLL_ATTEMPTS {
            chain = order.certificate().await?;
            if chain.is_some() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let chain = chain.ok_or_else(|| AcmeError::Order("certificate was not issued in time".into()))?;

        let pem = format!("{}{}", key.serialize_pem(), chain);
        let path = self.cert_cache_path();
        write_private(&path, pem.as_bytes()).map_err(|e| Self::cache_err(&path, e))?;
        self.load_cached()?;
        tracing::info!(host = %self.host, "Obtained Let's Encrypt certificate");
        Ok(())
    }
}

/// Only a `Ready` order can be finalized with a freshly generated key. A
/// `Valid` order was finalized elsewhere, so its certificate would not
/// match any key we hold.
fn check_finalizable(status: OrderStatus, host: &str) -> Result<(), AcmeError> {
    match status {
        OrderStatus::Ready => Ok(()),
        OrderStatus::Invalid => Err(AcmeError::Order(format!("order for {host} is invalid"))),
        OrderStatus::Valid => Err(AcmeError::Order(format!(
            "order for {host} was already finalized without a local key"
        ))),
        other => Err(AcmeError::Order(format!(
            "order for {host} not ready for finalization: {other:?}"
        ))),
    }
}

fn certified_key_from_pem(pem: &[u8]) -> Result<CertifiedKey, String> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("parse certificate: {e}"))?;
    if certs.is_empty() {
        return Err("no certificates found".into());
    }
    let key = rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| format!("parse private key: {e}"))?
        .ok_or_else(|| "no private key found".to_string())?;
    let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key)
        .map_err(|e| e.to_string())?;
    Ok(CertifiedKey::new(certs, signing_key))
}

fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(contents)
}

/// Router answering HTTP-01 challenges; anything else is redirected to
/// HTTPS on `host`.
pub fn challenge_router(store: ChallengeStore, host: &str) -> Router {
    let host = host.to_string();
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(serve_token))
        .fallback(move |uri: Uri| {
            let host = host.clone();
            async move { redirect_to_https(&host, &uri) }
        })
        .with_state(store)
}

async fn serve_token(State(store): State<ChallengeStore>, UrlPath(token): UrlPath<String>) -> Response {
    match store.get(&token) {
        Some(key_auth) => (StatusCode::OK, key_auth.value().clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn redirect_to_https(host: &str, uri: &Uri) -> Response {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Redirect::permanent(&format!("https://{host}{path}")).into_response()
}

/// Handle to the challenge responder task.
#[derive(Debug)]
pub struct ChallengeHandle {
    task: JoinHandle<io::Result<()>>,
}

impl ChallengeHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the responder to stop. Bind failures surface here.
    pub async fn wait(self) -> io::Result<()> {
        self.task
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)))
    }
}

/// Spawn the challenge responder on `listen`. Failures are logged.
pub fn spawn_challenge_responder(
    listen: &str,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> ChallengeHandle {
    let listen = listen.to_string();
    let task = tokio::spawn(async move {
        let result = async {
            let addr = match ListenAddress::parse(&listen, 80) {
                Ok(ListenAddress::Tcp(addr)) => addr,
                Ok(other) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("challenge listener must be TCP, got {other}"),
                    ))
                }
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidInput, e)),
            };
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(address = %addr, "Listening for Let's Encrypt challenges");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(address = %listen, error = %e, "Error starting Let's Encrypt HTTP listener");
        }
        result
    });
    ChallengeHandle { task }
}

/// Background tasks of the Let's Encrypt strategy.
#[derive(Debug)]
pub struct AcmeHandle {
    pub challenge: ChallengeHandle,
    pub issuer: JoinHandle<()>,
}

async fn run_issuer(manager: Arc<AcmeManager>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = manager.wake.notified() => {}
            _ = shutdown.recv() => break,
        }
        if !manager.resolver.needs_certificate() {
            continue;
        }

        match manager.obtain().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(host = %manager.host, error = %e, "Let's Encrypt order failed");
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }
    }
    tracing::debug!("Let's Encrypt issuer stopped");
}

/// Start the Let's Encrypt strategy against the production directory.
pub fn start(
    host: &str,
    cache_dir: &Path,
    listen: &str,
    shutdown: &broadcast::Sender<()>,
) -> Result<(Arc<AcmeResolver>, AcmeHandle), TlsError> {
    start_with_directory(host, cache_dir, listen, LetsEncrypt::Production.url(), shutdown)
}

/// Start the Let's Encrypt strategy against an arbitrary ACME directory.
pub fn start_with_directory(
    host: &str,
    cache_dir: &Path,
    listen: &str,
    directory_url: &str,
    shutdown: &broadcast::Sender<()>,
) -> Result<(Arc<AcmeResolver>, AcmeHandle), TlsError> {
    make_directories(cache_dir).map_err(|e| TlsError::AcmeSetup(e.to_string()))?;

    let manager = Arc::new(AcmeManager::new(host, cache_dir, directory_url));
    manager
        .load_cached()
        .map_err(|e| TlsError::AcmeSetup(e.to_string()))?;

    let challenge = spawn_challenge_responder(
        listen,
        challenge_router(manager.challenges(), host),
        shutdown.subscribe(),
    );
    let resolver = manager.resolver();
    let issuer = tokio::spawn(run_issuer(manager, shutdown.subscribe()));

    Ok((resolver, AcmeHandle { challenge, issuer }))
}
