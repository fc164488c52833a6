//! Self-signed certificate generation and PEM loading.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType, PKCS_ECDSA_P256_SHA256};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use time::{Duration, OffsetDateTime};

use crate::config::defaults::SELF_SIGNED_CERT_ORGANIZATION;
use crate::net::tls::TlsError;

/// Validity of generated certificates (14 months).
pub const DEFAULT_AUTOGEN_VALIDITY: Duration = Duration::days(420);

/// A certificate chain and its private key.
#[derive(Debug)]
pub struct CertPair {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Generate a pair at `cert_path`/`key_path` unless either file exists.
///
/// Returns whether a new pair was written. An existing file, possibly
/// supplied by the operator, is never overwritten.
pub fn ensure_self_signed(cert_path: &Path, key_path: &Path) -> Result<bool, TlsError> {
    if cert_path.exists() || key_path.exists() {
        return Ok(false);
    }
    generate_self_signed(cert_path, key_path, DEFAULT_AUTOGEN_VALIDITY)?;
    Ok(true)
}

/// Write a new ECDSA P-256 self-signed pair valid for `localhost` and the
/// loopback addresses.
pub fn generate_self_signed(
    cert_path: &Path,
    key_path: &Path,
    validity: Duration,
) -> Result<(), TlsError> {
    let gen_err = |e: rcgen::Error| TlsError::CertGenerationFailed(e.to_string());

    let mut params = CertificateParams::new(vec!["localhost".to_string()]).map_err(gen_err)?;
    params.subject_alt_names.extend([
        SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)),
    ]);

    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, SELF_SIGNED_CERT_ORGANIZATION);
    name.push(DnType::CommonName, "localhost");
    params.distinguished_name = name;

    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::hours(1);
    params.not_after = now + validity;

    let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(gen_err)?;
    let cert = params.self_signed(&key).map_err(gen_err)?;

    write_private(key_path, key.serialize_pem().as_bytes())?;
    fs::write(cert_path, cert.pem()).map_err(|e| {
        TlsError::CertGenerationFailed(format!("write {}: {e}", cert_path.display()))
    })?;

    tracing::info!(
        cert_path = %cert_path.display(),
        key_path = %key_path.display(),
        "Generated self-signed TLS certificate"
    );
    Ok(())
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), TlsError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(path)
        .and_then(|mut file| file.write_all(contents))
        .map_err(|e| TlsError::CertGenerationFailed(format!("write {}: {e}", path.display())))
}

/// Load a PEM certificate chain and private key.
pub fn load_cert_pair(cert_path: &Path, key_path: &Path) -> Result<CertPair, TlsError> {
    let load_err = |path: &Path, reason: String| TlsError::CertLoadFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(cert_path).map_err(|e| load_err(cert_path, e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| load_err(cert_path, format!("parse certificate: {e}")))?;
    if certs.is_empty() {
        return Err(load_err(cert_path, "no certificates found".into()));
    }

    let file = File::open(key_path).map_err(|e| load_err(key_path, e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| load_err(key_path, format!("parse private key: {e}")))?
        .ok_or_else(|| load_err(key_path, "no private key found".into()))?;

    Ok(CertPair { certs, key })
}
