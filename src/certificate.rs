use std::pin::Pin;

use ::time::{format_description::well_known, OffsetDateTime};
use log::debug;
use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::X509VerifyResult;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time;
use tokio_openssl::SslStream;
use x509_parser::parse_x509_certificate;

use crate::config::ScanConfig;
use crate::connector::{ConnectError, Connector};
use crate::types::Finding;

pub const NO_CERTIFICATE: &str = "No SSL certificate found";
pub const CERTIFICATE_EXPIRED: &str = "SSL certificate expired";
pub const SELF_SIGNED: &str = "Self-signed SSL certificate";
pub const WEAK_ENCRYPTION: &str = "Weak encryption algorithm used";
pub const VERIFICATION_FAILED: &str = "Certificate failed verification";

/// Ciphers with fewer secret bits than this are reported as weak.
pub const MIN_CIPHER_BITS: i32 = 128;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("TLS setup failed: {0}")]
    Setup(#[from] ErrorStack),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] openssl::ssl::Error),

    #[error("TLS handshake timed out")]
    Timeout,
}

/// What a completed handshake revealed about the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSession {
    /// DER encoding of the leaf certificate, if the server sent one.
    pub certificate_der: Option<Vec<u8>>,
    pub cipher_name: Option<String>,
    pub cipher_bits: Option<i32>,
    /// Chain or hostname verification error against the default trust store.
    pub verify_error: Option<String>,
}

/// Handshake with `addr:port` and report certificate problems.
///
/// `server_name` is sent as SNI and checked against the certificate.
/// Connection and handshake failures yield no findings.
pub async fn inspect_certificate<C: Connector>(
    connector: &C,
    addr: &str,
    server_name: &str,
    port: u16,
    config: &ScanConfig,
) -> Vec<Finding> {
    match handshake(connector, addr, server_name, port, config).await {
        Ok(session) => {
            debug!(
                "TLS on port {port}: cipher {} ({} bits)",
                session.cipher_name.as_deref().unwrap_or("unknown"),
                session.cipher_bits.unwrap_or_default()
            );
            evaluate_session(&session, OffsetDateTime::now_utc())
        }
        Err(e) => {
            debug!("certificate inspection on port {port} skipped: {e}");
            Vec::new()
        }
    }
}

/// Perform a TLS handshake over a fresh connection and capture the peer's details.
///
/// The default trust store and hostname checks are configured, but a failed
/// verification does not abort the handshake; it is recorded in
/// [`TlsSession::verify_error`] so the certificate can still be evaluated.
pub async fn handshake<C: Connector>(
    connector: &C,
    addr: &str,
    server_name: &str,
    port: u16,
    config: &ScanConfig,
) -> Result<TlsSession, InspectError> {
    let tcp = connector.connect(addr, port).await?;

    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    let ssl = builder.build().configure()?.into_ssl(server_name)?;
    let mut stream = SslStream::new(ssl, tcp)?;

    time::timeout(config.io_timeout, Pin::new(&mut stream).connect())
        .await
        .map_err(|_| InspectError::Timeout)??;

    let ssl = stream.ssl();
    let certificate_der = ssl.peer_certificate().map(|c| c.to_der()).transpose()?;
    let (cipher_name, cipher_bits) = match ssl.current_cipher() {
        Some(c) => (Some(c.name().to_string()), Some(c.bits().secret)),
        None => (None, None),
    };
    let verify = ssl.verify_result();
    let verify_error = (certificate_der.is_some() && verify != X509VerifyResult::OK)
        .then(|| verify.error_string().to_string());

    let session = TlsSession {
        certificate_der,
        cipher_name,
        cipher_bits,
        verify_error,
    };

    // close_notify is a courtesy; the socket is released on drop either way.
    let _ = time::timeout(config.io_timeout, stream.shutdown()).await;
    Ok(session)
}

/// Evaluate a captured session at time `now`.
///
/// Checks run in a fixed order: missing certificate, expiry, self-signature,
/// cipher strength, then verification. A certificate that cannot be parsed
/// skips the expiry and self-signature checks.
pub fn evaluate_session(session: &TlsSession, now: OffsetDateTime) -> Vec<Finding> {
    let Some(der) = session.certificate_der.as_deref() else {
        return vec![Finding::CertificateIssue(NO_CERTIFICATE.into())];
    };

    let mut findings = Vec::new();
    match parse_x509_certificate(der) {
        Ok((_, cert)) => {
            let not_after = cert.validity().not_after.timestamp();
            if not_after < now.unix_timestamp() {
                findings.push(Finding::CertificateIssue(format!(
                    "{CERTIFICATE_EXPIRED} (notAfter {})",
                    format_timestamp(not_after)
                )));
            }
            if cert.issuer().as_raw() == cert.subject().as_raw() {
                findings.push(Finding::CertificateIssue(SELF_SIGNED.into()));
            }
        }
        Err(e) => debug!("unparseable peer certificate: {e}"),
    }

    if session.cipher_bits.is_some_and(|bits| bits < MIN_CIPHER_BITS) {
        findings.push(Finding::CertificateIssue(format!(
            "{WEAK_ENCRYPTION} ({})",
            session.cipher_name.as_deref().unwrap_or("unknown cipher")
        )));
    }

    if let Some(reason) = &session.verify_error {
        findings.push(Finding::CertificateIssue(format!(
            "{VERIFICATION_FAILED}: {reason}"
        )));
    }

    findings
}

fn format_timestamp(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(&well_known::Rfc3339).ok())
        .unwrap_or_else(|| unix.to_string())
}
