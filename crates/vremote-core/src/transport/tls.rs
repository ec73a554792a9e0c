//! TLS session setup over an established TCP stream.
//!
//! Credentials (trust anchors, client certificate and key) are loaded once
//! per process and shared by every connection. Each negotiation builds its
//! own verifier bound to the target hostname and the per-URI override.
//!
//! Verification policy:
//! - chain trust is checked against the loaded trust anchors
//! - the leaf must be X.509, every presented certificate must be inside its
//!   validity window, and the leaf must name the target host
//! - `no_verify` waives chain-trust failures only; the leaf checks always
//!   apply
//!
//! After the handshake the daemon sends one byte (0x01) once it has accepted
//! our certificate and address.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::cert::{check_presented_chain, fingerprint, load_certs_from_pem, load_key_from_pem};
use crate::constants::{DEFAULT_CA_CERT, DEFAULT_CLIENT_CERT, DEFAULT_CLIENT_KEY, TLS_LIVENESS_BYTE};
use crate::error::{CertificateFailure, Error, Result, TlsError};

/// Where the TLS credential files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            ca_cert: PathBuf::from(DEFAULT_CA_CERT),
            client_cert: PathBuf::from(DEFAULT_CLIENT_CERT),
            client_key: PathBuf::from(DEFAULT_CLIENT_KEY),
        }
    }
}

impl TlsPaths {
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = path.into();
        self
    }

    pub fn with_client_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert = path.into();
        self
    }

    pub fn with_client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_key = path.into();
        self
    }
}

/// Process-wide TLS credentials.
pub struct TlsContext {
    provider: Arc<CryptoProvider>,
    roots: Arc<RootCertStore>,
    client_chain: Vec<CertificateDer<'static>>,
    client_key: PrivateKeyDer<'static>,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("roots", &self.roots.len())
            .field("client_chain", &self.client_chain.len())
            .finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Read and parse the credential files.
    pub async fn load(paths: &TlsPaths) -> Result<Self> {
        let ca = read_credential(&paths.ca_cert, "CA certificate").await?;
        let cert = read_credential(&paths.client_cert, "client certificate").await?;
        let key = read_credential(&paths.client_key, "client key").await?;
        Self::from_pem(&ca, &cert, &key)
    }

    /// Build a context from in-memory PEM data.
    pub fn from_pem(ca_pem: &[u8], cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for anchor in load_certs_from_pem(ca_pem)? {
            roots.add(anchor).map_err(|e| TlsError::Credentials {
                message: format!("unable to add trust anchor: {}", e),
            })?;
        }

        let client_chain = load_certs_from_pem(cert_pem)?;
        let client_key = load_key_from_pem(key_pem)?;

        debug!(
            anchors = roots.len(),
            chain = client_chain.len(),
            "Loaded TLS credentials"
        );

        Ok(Self {
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
            roots: Arc::new(roots),
            client_chain,
            client_key,
        })
    }

    /// A verifier enforcing the connection policy for `hostname`.
    pub fn verifier(&self, hostname: &str, no_verify: bool) -> Result<PolicyVerifier> {
        let inner = WebPkiServerVerifier::builder_with_provider(
            self.roots.clone(),
            self.provider.clone(),
        )
        .build()
        .map_err(|e| TlsError::Credentials {
            message: format!("unable to build certificate verifier: {}", e),
        })?;

        let server_name = server_name(hostname)?;

        Ok(PolicyVerifier {
            inner,
            server_name,
            hostname: hostname.to_string(),
            no_verify,
            failure: Mutex::new(None),
        })
    }

    fn client_config(&self, verifier: Arc<PolicyVerifier>) -> Result<Arc<ClientConfig>> {
        let config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::Credentials {
                message: format!("unsupported protocol versions: {}", e),
            })?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(self.client_chain.clone(), self.client_key.clone_key())
            .map_err(|e| TlsError::Credentials {
                message: format!("client certificate rejected: {}", e),
            })?;
        Ok(Arc::new(config))
    }
}

async fn read_credential(path: &Path, what: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        TlsError::Credentials {
            message: format!("unable to read {} {}: {}", what, path.display(), e),
        }
        .into()
    })
}

fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    let bare = hostname.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(bare.to_string()).map_err(|e| Error::Config {
        message: format!("invalid TLS server name '{}': {}", hostname, e),
    })
}

/// Server certificate verifier applying the connection policy.
///
/// The reason for the last rejection is kept so the caller can report it
/// precisely instead of the generic handshake alert.
#[derive(Debug)]
pub struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    server_name: ServerName<'static>,
    hostname: String,
    no_verify: bool,
    failure: Mutex<Option<CertificateFailure>>,
}

impl PolicyVerifier {
    /// Apply the policy to a presented chain.
    pub fn check(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> std::result::Result<(), CertificateFailure> {
        debug!(
            fingerprint = %fingerprint(end_entity.as_ref()),
            host = %self.hostname,
            "Verifying server certificate"
        );

        let chain = self
            .inner
            .verify_server_cert(end_entity, intermediates, &self.server_name, &[], now);

        let presented: Vec<&[u8]> = intermediates.iter().map(|c| c.as_ref()).collect();
        check_presented_chain(end_entity.as_ref(), &presented, &self.hostname, now.as_secs())?;

        if let Err(e) = chain.or_else(ignore_name_error) {
            let failure = classify(&e);
            if !self.no_verify || !failure.is_trust_failure() {
                return Err(failure);
            }
            warn!(
                host = %self.hostname,
                reason = %failure,
                "Certificate check failed, continuing because no_verify is set"
            );
        }
        Ok(())
    }

    /// Take the reason recorded by the last rejection.
    pub fn take_failure(&self) -> Option<CertificateFailure> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self.check(end_entity, intermediates, now) {
            Ok(()) => Ok(ServerCertVerified::assertion()),
            Err(failure) => {
                let err = to_rustls(&failure);
                if let Ok(mut slot) = self.failure.lock() {
                    *slot = Some(failure);
                }
                Err(rustls::Error::InvalidCertificate(err))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Hostname binding is decided by [`check_presented_chain`], which also
/// accepts the subject CN. webpki reports a name error only after the chain
/// itself validated, so such a result counts as a trusted chain.
fn ignore_name_error(
    err: rustls::Error,
) -> std::result::Result<ServerCertVerified, rustls::Error> {
    match err {
        rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
        ) => Ok(ServerCertVerified::assertion()),
        other => Err(other),
    }
}

/// Map a chain-validation error onto the reported reasons. Anything not
/// specifically recognised is an untrusted chain.
fn classify(err: &rustls::Error) -> CertificateFailure {
    match err {
        rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer) => {
            CertificateFailure::UnknownIssuer
        }
        rustls::Error::InvalidCertificate(CertificateError::Revoked) => CertificateFailure::Revoked,
        // webpki folds unsupported signature algorithms into BadSignature.
        rustls::Error::InvalidCertificate(CertificateError::BadSignature) => {
            CertificateFailure::InsecureAlgorithm
        }
        _ => CertificateFailure::Untrusted,
    }
}

fn to_rustls(failure: &CertificateFailure) -> CertificateError {
    match failure {
        CertificateFailure::Untrusted => CertificateError::ApplicationVerificationFailure,
        CertificateFailure::UnknownIssuer => CertificateError::UnknownIssuer,
        CertificateFailure::Revoked => CertificateError::Revoked,
        CertificateFailure::InsecureAlgorithm => CertificateError::BadSignature,
        CertificateFailure::WrongType => CertificateError::BadEncoding,
        CertificateFailure::Expired => CertificateError::Expired,
        CertificateFailure::NotYetActive => CertificateError::NotValidYet,
        CertificateFailure::HostnameMismatch { .. } => CertificateError::NotValidForName,
    }
}

/// Run the TLS handshake on `tcp`, enforce the verification policy and wait
/// for the daemon's liveness byte.
pub async fn negotiate(
    ctx: &TlsContext,
    tcp: TcpStream,
    hostname: &str,
    no_verify: bool,
) -> Result<TlsStream<TcpStream>> {
    let verifier = Arc::new(ctx.verifier(hostname, no_verify)?);
    let config = ctx.client_config(verifier.clone())?;
    let connector = TlsConnector::from(config);

    debug!(host = %hostname, no_verify, "Starting TLS handshake");
    let mut stream = match connector.connect(verifier.server_name.clone(), tcp).await {
        Ok(stream) => stream,
        Err(e) => {
            return Err(match verifier.take_failure() {
                Some(failure) => TlsError::Certificate(failure).into(),
                None => TlsError::Handshake {
                    message: e.to_string(),
                }
                .into(),
            });
        }
    };

    let mut byte = [0u8; 1];
    match stream.read_exact(&mut byte).await {
        Ok(_) if byte[0] == TLS_LIVENESS_BYTE => {
            debug!(host = %hostname, "TLS session established");
            Ok(stream)
        }
        Ok(_) => {
            debug!(byte = byte[0], "Unexpected liveness byte");
            Err(TlsError::ServerVerificationFailed.into())
        }
        Err(e) => {
            debug!(error = %e, "No liveness byte from server");
            Err(TlsError::ServerVerificationFailed.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let paths = TlsPaths::default();
        assert_eq!(paths.ca_cert, PathBuf::from(DEFAULT_CA_CERT));
        assert_eq!(paths.client_cert, PathBuf::from(DEFAULT_CLIENT_CERT));
        assert_eq!(paths.client_key, PathBuf::from(DEFAULT_CLIENT_KEY));
    }

    #[test]
    fn path_overrides() {
        let paths = TlsPaths::default()
            .with_ca_cert("/tmp/ca.pem")
            .with_client_key("/tmp/key.pem");
        assert_eq!(paths.ca_cert, PathBuf::from("/tmp/ca.pem"));
        assert_eq!(paths.client_cert, PathBuf::from(DEFAULT_CLIENT_CERT));
        assert_eq!(paths.client_key, PathBuf::from("/tmp/key.pem"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths::default()
            .with_ca_cert(dir.path().join("ca.pem"))
            .with_client_cert(dir.path().join("cert.pem"))
            .with_client_key(dir.path().join("key.pem"));

        let err = TlsContext::load(&paths).await.unwrap_err();
        assert!(matches!(err, Error::Tls(TlsError::Credentials { .. })));
        assert!(err.to_string().contains("ca.pem"));
    }

    #[test]
    fn classify_unknown_issuer() {
        let err = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert_eq!(classify(&err), CertificateFailure::UnknownIssuer);
        let err = rustls::Error::General("x".into());
        assert_eq!(classify(&err), CertificateFailure::Untrusted);
    }

    #[test]
    fn classify_bad_signature_as_insecure_algorithm() {
        let err = rustls::Error::InvalidCertificate(CertificateError::BadSignature);
        assert_eq!(classify(&err), CertificateFailure::InsecureAlgorithm);
    }

    #[test]
    fn name_errors_do_not_fail_the_chain() {
        let err = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert!(ignore_name_error(err).is_ok());

        let err = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert!(ignore_name_error(err).is_err());
    }
}
