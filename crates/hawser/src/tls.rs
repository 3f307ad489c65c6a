//! TLS configuration and the certificate-validation policy.
//!
//! # Custom CA Certificates
//!
//! ```ignore
//! use hawser::{Certificate, ClientConfig, TlsConfig};
//!
//! // Load from PEM file
//! let ca_cert = Certificate::from_pem_file("/path/to/ca.crt")?;
//!
//! // Or from PEM bytes
//! let ca_cert = Certificate::from_pem(pem_bytes)?;
//!
//! let tls = TlsConfig::new().add_root_certificate(ca_cert);
//! let config = ClientConfig::new().tls(tls);
//! ```
//!
//! # Validation policy
//!
//! Every TLS handshake runs the server certificate through a validation
//! policy that classifies the transport-reported result into a
//! [`CertificateValidationOutcome`] and reports it to a
//! [`ValidationObserver`] before the handshake result is returned.
//!
//! By default the classified outcome does not affect the handshake: it is
//! reported and then discarded, and the session is established with the
//! certificate accepted as-is. Call [`TlsConfig::enforce_validation`] to
//! make reject outcomes fail the handshake instead. See the [`TlsConfig`]
//! documentation for the security implications of the lenient default.

use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::TlsError;

/// Minimum TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVersion {
    /// TLS 1.2 (default minimum).
    #[default]
    Tls1_2,
    /// TLS 1.3 (most secure).
    Tls1_3,
}

impl TlsVersion {
    /// Convert to rustls protocol versions.
    pub(crate) fn to_rustls_versions(self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        match self {
            TlsVersion::Tls1_2 => vec![&rustls::version::TLS12, &rustls::version::TLS13],
            TlsVersion::Tls1_3 => vec![&rustls::version::TLS13],
        }
    }
}

/// A TLS certificate to add to the trust store.
#[derive(Clone)]
pub struct Certificate {
    der_certs: Vec<CertificateDer<'static>>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("cert_count", &self.der_certs.len())
            .finish()
    }
}

impl Certificate {
    /// Load a certificate from PEM-encoded bytes.
    ///
    /// This can contain multiple certificates (a certificate chain).
    pub fn from_pem(pem_data: impl AsRef<[u8]>) -> Result<Self, TlsError> {
        let mut reader = BufReader::new(Cursor::new(pem_data.as_ref()));
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::Config(format!("failed to parse PEM certificate: {e}")))?;

        if certs.is_empty() {
            return Err(TlsError::Config(
                "no certificates found in PEM data".to_string(),
            ));
        }

        Ok(Self { der_certs: certs })
    }

    /// Load a certificate from a PEM-encoded file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TlsError> {
        let pem_data = std::fs::read(path.as_ref()).map_err(|e| {
            TlsError::Config(format!(
                "failed to read certificate file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_pem(pem_data)
    }

    /// Load a certificate from DER-encoded bytes.
    pub fn from_der(der_data: impl Into<Vec<u8>>) -> Self {
        Self {
            der_certs: vec![CertificateDer::from(der_data.into())],
        }
    }

    /// Load a certificate from a DER-encoded file.
    pub fn from_der_file(path: impl AsRef<Path>) -> Result<Self, TlsError> {
        let der_data = std::fs::read(path.as_ref()).map_err(|e| {
            TlsError::Config(format!(
                "failed to read certificate file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::from_der(der_data))
    }

    /// Get the DER-encoded certificates.
    pub(crate) fn der_certs(&self) -> &[CertificateDer<'static>] {
        &self.der_certs
    }
}

/// Outcome of validating a server certificate during a handshake.
///
/// Computed once per handshake and reported to the [`ValidationObserver`];
/// never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateValidationOutcome {
    /// The certificate passed validation.
    Accept,
    /// The presented certificate does not match the requested host name.
    RejectNameMismatch,
    /// No usable certificate was presented.
    RejectUnavailable,
    /// The certificate chain failed validation (untrusted root, expired,
    /// revoked, ...).
    RejectChainError,
}

impl CertificateValidationOutcome {
    /// Whether the certificate was accepted by the policy.
    pub fn is_accepted(self) -> bool {
        self == Self::Accept
    }
}

impl std::fmt::Display for CertificateValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accepted"),
            Self::RejectNameMismatch => {
                write!(f, "rejected: certificate name does not match the requested host")
            }
            Self::RejectUnavailable => write!(f, "rejected: certificate unavailable"),
            Self::RejectChainError => write!(f, "rejected: certificate chain validation failed"),
        }
    }
}

/// Receiver for certificate-validation outcomes.
///
/// Injected into the client at construction time; invoked once per
/// handshake, before the handshake result is returned to the caller.
pub trait ValidationObserver: Send + Sync {
    /// Called with the host the handshake targeted and the computed outcome.
    fn certificate_validated(&self, host: &str, outcome: CertificateValidationOutcome);
}

/// Default observer that reports outcomes through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ValidationObserver for TracingObserver {
    fn certificate_validated(&self, host: &str, outcome: CertificateValidationOutcome) {
        if outcome.is_accepted() {
            tracing::debug!(target: "hawser::tls", "Certificate for '{}' {}", host, outcome);
        } else {
            tracing::warn!(target: "hawser::tls", "Certificate for '{}' {}", host, outcome);
        }
    }
}

/// TLS configuration for secure connections.
///
/// # Validation enforcement
///
/// With the default settings the validation policy is *observational*: the
/// outcome is classified and reported, but the handshake proceeds no matter
/// what was presented. That keeps the session open even for certificates
/// that fail name or chain checks, so it is only appropriate where the
/// surrounding deployment pins trust some other way. Call
/// [`enforce_validation`](Self::enforce_validation) to make reject outcomes
/// abort the handshake.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Additional root certificates to trust.
    pub root_certificates: Vec<Certificate>,
    /// Whether to use only the provided root certificates (no bundled roots).
    pub use_only_custom_roots: bool,
    /// Minimum TLS version.
    pub min_version: TlsVersion,
    /// Whether reject outcomes from the validation policy fail the handshake.
    pub enforce: bool,
}

impl TlsConfig {
    /// Create a new TLS configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root certificate to trust.
    pub fn add_root_certificate(mut self, cert: Certificate) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Use only custom root certificates (disable the bundled webpki roots).
    pub fn use_only_custom_roots(mut self) -> Self {
        self.use_only_custom_roots = true;
        self
    }

    /// Set the minimum TLS version.
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Make reject outcomes from the validation policy fail the handshake.
    pub fn enforce_validation(mut self) -> Self {
        self.enforce = true;
        self
    }

    /// Build a rustls `ClientConfig` with the validation policy installed.
    pub(crate) fn build_client_config(
        &self,
        observer: Arc<dyn ValidationObserver>,
    ) -> Result<Arc<rustls::ClientConfig>, TlsError> {
        let root_store = self.build_root_store()?;
        let versions = self.min_version.to_rustls_versions();

        let webpki: Arc<dyn ServerCertVerifier> = WebPkiServerVerifier::builder(Arc::new(root_store))
            .build()
            .map_err(|e| TlsError::Config(format!("failed to build certificate verifier: {e}")))?;

        let verifier = Arc::new(PolicyVerifier {
            inner: webpki,
            observer,
            enforce: self.enforce,
        });

        let config = rustls::ClientConfig::builder_with_protocol_versions(&versions)
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(Arc::new(config))
    }

    /// Build the root certificate store.
    fn build_root_store(&self) -> Result<RootCertStore, TlsError> {
        let mut root_store = RootCertStore::empty();

        if !self.use_only_custom_roots {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        for cert in &self.root_certificates {
            for der_cert in cert.der_certs() {
                root_store.add(der_cert.clone()).map_err(|e| {
                    TlsError::Config(format!("failed to add root certificate: {e}"))
                })?;
            }
        }

        if root_store.is_empty() {
            return Err(TlsError::Config(
                "no root certificates available; either add custom certificates or \
                 don't use use_only_custom_roots()"
                    .to_string(),
            ));
        }

        Ok(root_store)
    }
}

/// Server certificate verifier that runs the validation policy.
///
/// Wraps the webpki verifier: its result is classified into a
/// [`CertificateValidationOutcome`] and reported to the observer. When
/// `enforce` is false the classified outcome is then discarded and the
/// certificate is accepted regardless; signature verification still
/// delegates to the inner verifier in both modes.
pub(crate) struct PolicyVerifier {
    inner: Arc<dyn ServerCertVerifier>,
    observer: Arc<dyn ValidationObserver>,
    enforce: bool,
}

impl std::fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyVerifier")
            .field("enforce", &self.enforce)
            .finish()
    }
}

/// Map a transport-reported validation error onto the policy outcome.
///
/// Precedence: name mismatch, then unavailable certificate, then any other
/// chain failure.
fn classify_validation_error(err: &rustls::Error) -> CertificateValidationOutcome {
    match err {
        rustls::Error::InvalidCertificate(cert_err) => match cert_err {
            CertificateError::NotValidForName
            | CertificateError::NotValidForNameContext { .. } => {
                CertificateValidationOutcome::RejectNameMismatch
            }
            CertificateError::BadEncoding => CertificateValidationOutcome::RejectUnavailable,
            _ => CertificateValidationOutcome::RejectChainError,
        },
        rustls::Error::NoCertificatesPresented => CertificateValidationOutcome::RejectUnavailable,
        _ => CertificateValidationOutcome::RejectChainError,
    }
}

/// Printable host label for observer events.
fn server_name_label(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_string(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        other => format!("{other:?}"),
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let result = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );

        let outcome = match &result {
            Ok(_) => CertificateValidationOutcome::Accept,
            Err(err) => classify_validation_error(err),
        };
        self.observer
            .certificate_validated(&server_name_label(server_name), outcome);

        if self.enforce {
            result
        } else {
            // Outcome reported above, then discarded: the handshake proceeds
            // with the certificate accepted as-is.
            Ok(ServerCertVerified::assertion())
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Install the ring crypto provider for tests.
    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    /// Observer that records every reported outcome.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<(String, CertificateValidationOutcome)>>,
    }

    impl ValidationObserver for RecordingObserver {
        fn certificate_validated(&self, host: &str, outcome: CertificateValidationOutcome) {
            self.events.lock().push((host.to_string(), outcome));
        }
    }

    /// Inner verifier stub that always fails with a fixed error.
    #[derive(Debug)]
    struct FailingVerifier(rustls::Error);

    impl ServerCertVerifier for FailingVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Err(self.0.clone())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![SignatureScheme::ED25519]
        }
    }

    fn run_policy(
        inner_error: Option<rustls::Error>,
        enforce: bool,
    ) -> (
        Result<ServerCertVerified, rustls::Error>,
        Vec<(String, CertificateValidationOutcome)>,
    ) {
        // Inner verifier stub that always accepts.
        #[derive(Debug)]
        struct AcceptingVerifier;

        impl ServerCertVerifier for AcceptingVerifier {
            fn verify_server_cert(
                &self,
                _end_entity: &CertificateDer<'_>,
                _intermediates: &[CertificateDer<'_>],
                _server_name: &ServerName<'_>,
                _ocsp_response: &[u8],
                _now: UnixTime,
            ) -> Result<ServerCertVerified, rustls::Error> {
                Ok(ServerCertVerified::assertion())
            }

            fn verify_tls12_signature(
                &self,
                _message: &[u8],
                _cert: &CertificateDer<'_>,
                _dss: &DigitallySignedStruct,
            ) -> Result<HandshakeSignatureValid, rustls::Error> {
                Ok(HandshakeSignatureValid::assertion())
            }

            fn verify_tls13_signature(
                &self,
                _message: &[u8],
                _cert: &CertificateDer<'_>,
                _dss: &DigitallySignedStruct,
            ) -> Result<HandshakeSignatureValid, rustls::Error> {
                Ok(HandshakeSignatureValid::assertion())
            }

            fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
                vec![SignatureScheme::ED25519]
            }
        }

        let inner: Arc<dyn ServerCertVerifier> = match inner_error {
            Some(err) => Arc::new(FailingVerifier(err)),
            None => Arc::new(AcceptingVerifier),
        };
        let observer = Arc::new(RecordingObserver::default());
        let verifier = PolicyVerifier {
            inner,
            observer: observer.clone(),
            enforce,
        };

        let end_entity = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
        let server_name = ServerName::try_from("example.test").unwrap();
        let result = verifier.verify_server_cert(
            &end_entity,
            &[],
            &server_name,
            &[],
            UnixTime::now(),
        );
        let events = observer.events.lock().clone();
        (result, events)
    }

    #[test]
    fn test_classify_name_mismatch() {
        let err = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert_eq!(
            classify_validation_error(&err),
            CertificateValidationOutcome::RejectNameMismatch
        );
    }

    #[test]
    fn test_classify_unavailable() {
        let err = rustls::Error::InvalidCertificate(CertificateError::BadEncoding);
        assert_eq!(
            classify_validation_error(&err),
            CertificateValidationOutcome::RejectUnavailable
        );
        assert_eq!(
            classify_validation_error(&rustls::Error::NoCertificatesPresented),
            CertificateValidationOutcome::RejectUnavailable
        );
    }

    #[test]
    fn test_classify_chain_errors() {
        for cert_err in [
            CertificateError::UnknownIssuer,
            CertificateError::Expired,
            CertificateError::Revoked,
            CertificateError::NotValidYet,
        ] {
            let err = rustls::Error::InvalidCertificate(cert_err);
            assert_eq!(
                classify_validation_error(&err),
                CertificateValidationOutcome::RejectChainError
            );
        }
    }

    #[test]
    fn test_lenient_policy_reports_and_accepts() {
        let (result, events) = run_policy(
            Some(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName,
            )),
            false,
        );

        // The lenient default reports the reject outcome but the handshake
        // still proceeds. This mirrors deployments that pin trust outside
        // the certificate check; see TlsConfig::enforce_validation.
        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![(
                "example.test".to_string(),
                CertificateValidationOutcome::RejectNameMismatch
            )]
        );
    }

    #[test]
    fn test_enforcing_policy_rejects() {
        let (result, events) = run_policy(
            Some(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            )),
            true,
        );

        assert!(result.is_err());
        assert_eq!(
            events,
            vec![(
                "example.test".to_string(),
                CertificateValidationOutcome::RejectChainError
            )]
        );
    }

    #[test]
    fn test_policy_reports_accept() {
        let (result, events) = run_policy(None, true);

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![(
                "example.test".to_string(),
                CertificateValidationOutcome::Accept
            )]
        );
    }

    #[test]
    fn test_tls_version_default() {
        assert_eq!(TlsVersion::default(), TlsVersion::Tls1_2);
    }

    #[test]
    fn test_tls_version_to_rustls_versions() {
        assert_eq!(TlsVersion::Tls1_2.to_rustls_versions().len(), 2);
        assert_eq!(TlsVersion::Tls1_3.to_rustls_versions().len(), 1);
    }

    /// A simple self-signed certificate for testing.
    const TEST_PEM: &str = r#"-----BEGIN CERTIFICATE-----
MIIBkTCB+wIJAKHBfpegE3jEMA0GCSqGSIb3DQEBCwUAMBExDzANBgNVBAMMBnRl
c3RjYTAeFw0yMzAxMDEwMDAwMDBaFw0yNDAxMDEwMDAwMDBaMBExDzANBgNVBAMM
BnRlc3RjYTBcMA0GCSqGSIb3DQEBAQUAA0sAMEgCQQC7o96HtiK7onnPevKSE2LL
oSXwnmfYwZPV2bvfGS18lK8F+DL+42IjT3ucMXnLBhzNCLNKE8yCVK6LPlsvpNlX
AgMBAAGjUzBRMB0GA1UdDgQWBBQgHGHqPcVi1N4CG7IxDJaFMvP6XTAfBgNVHSME
GDAWgBQgHGHqPcVi1N4CG7IxDJaFMvP6XTAPBgNVHRMBAf8EBTADAQH/MA0GCSqG
SIb3DQEBCwUAA0EAGLJHfg9dS/T39L6VQLJeZcpH7mY8vKaM9dM/Zn3HMhfc0Yjv
3hxMPmPGjjpQ9JKaLI0Rq7n5oEUP+xluoAAfrQ==
-----END CERTIFICATE-----"#;

    #[test]
    fn test_certificate_from_pem() {
        let cert = Certificate::from_pem(TEST_PEM).unwrap();
        assert_eq!(cert.der_certs().len(), 1);
    }

    #[test]
    fn test_certificate_from_pem_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_PEM.as_bytes()).unwrap();

        let cert = Certificate::from_pem_file(file.path()).unwrap();
        assert_eq!(cert.der_certs().len(), 1);

        assert!(Certificate::from_pem_file("/nonexistent/ca.crt").is_err());
    }

    #[test]
    fn test_certificate_from_pem_rejects_empty() {
        assert!(Certificate::from_pem("not a certificate").is_err());
    }

    #[test]
    fn test_certificate_from_der() {
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x00];
        let cert = Certificate::from_der(der);
        assert_eq!(cert.der_certs().len(), 1);
    }

    #[test]
    fn test_build_client_config_with_bundled_roots() {
        install_crypto_provider();
        let config = TlsConfig::new();
        let built = config.build_client_config(Arc::new(TracingObserver));
        assert!(built.is_ok());
    }

    #[test]
    fn test_build_client_config_only_custom_roots_without_certs_fails() {
        install_crypto_provider();
        let config = TlsConfig::new().use_only_custom_roots();
        let built = config.build_client_config(Arc::new(TracingObserver));
        assert!(built.is_err());
    }

    #[test]
    fn test_tls_config_builder() {
        let config = TlsConfig::new()
            .min_version(TlsVersion::Tls1_3)
            .enforce_validation();

        assert_eq!(config.min_version, TlsVersion::Tls1_3);
        assert!(config.enforce);
        assert!(config.root_certificates.is_empty());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CertificateValidationOutcome::Accept.to_string(), "accepted");
        assert!(
            CertificateValidationOutcome::RejectNameMismatch
                .to_string()
                .contains("name")
        );
        assert!(CertificateValidationOutcome::Accept.is_accepted());
        assert!(!CertificateValidationOutcome::RejectChainError.is_accepted());
    }
}
