//! TLS context construction for pooled clients.
//!
//! Every tenant client shares one process-wide copy of the OS trust anchors.

use crate::config::{HostnameVerification, TrustStore};
use crate::error::HttpError;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::path::Path;
use std::sync::{Arc, OnceLock};

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// OS trust anchors, read on first use. Load failures are logged and leave
/// the slice empty.
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "skipping unreadable native root certificate");
        }
        match loaded.certs.len() {
            0 => tracing::warn!("OS trust store is empty"),
            count => tracing::debug!(count, "native root certificates loaded"),
        }
        loaded.certs
    })
}

/// Process default crypto provider, or a private aws-lc-rs instance when
/// nothing was installed.
#[must_use]
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, HttpError> {
    CertificateDer::pem_file_iter(path)
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| HttpError::Tls(Box::new(e)))
}

/// Build the root store for the configured trust material.
///
/// An empty native store is tolerated (plain HTTP still works and every TLS
/// handshake fails verification); an explicit PEM bundle must contain at
/// least one usable certificate.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the PEM file cannot be read or yields no
/// usable root certificate.
pub fn root_store(trust_store: &TrustStore) -> Result<RootCertStore, HttpError> {
    let mut store = RootCertStore::empty();
    match trust_store {
        TrustStore::Native => {
            let (added, ignored) = store.add_parsable_certificates(native_root_certs().iter().cloned());
            if ignored > 0 {
                tracing::warn!(added, ignored, "some native root certificates could not be parsed");
            }
        }
        TrustStore::PemFile(path) => {
            let certs = load_pem_certs(path)?;
            let found = certs.len();
            let (added, ignored) = store.add_parsable_certificates(certs);
            if ignored > 0 {
                tracing::warn!(added, ignored, path = %path.display(), "some trust store certificates could not be parsed");
            }
            if added == 0 {
                return Err(HttpError::Tls(
                    format!("no valid root CA certificates in {} (found {found})", path.display()).into(),
                ));
            }
        }
    }
    Ok(store)
}

/// Build a rustls `ClientConfig` for the given trust store and hostname policy.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the trust store is unusable or the verifier
/// cannot be constructed.
pub fn client_config(
    trust_store: &TrustStore,
    hostname_verification: HostnameVerification,
) -> Result<rustls::ClientConfig, HttpError> {
    let roots = root_store(trust_store)?;
    let provider = crypto_provider();

    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let config = match hostname_verification {
        HostnameVerification::AllowAll if roots.is_empty() => {
            tracing::warn!("trust store is empty, hostname policy ALLOW_ALL has no effect");
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        HostnameVerification::Strict => builder.with_root_certificates(roots).with_no_client_auth(),
        HostnameVerification::AllowAll => {
            let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| HttpError::Tls(Box::new(e)))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnyHostnameVerifier { inner }))
                .with_no_client_auth()
        }
    };

    Ok(config)
}

/// Verifies the certificate chain like webpki but ignores host name mismatches.
#[derive(Debug)]
struct AnyHostnameVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for AnyHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        // The chain is checked before the name, so a name error means the chain is valid.
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
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
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn native_roots_are_loaded_once() {
        assert!(std::ptr::eq(native_root_certs(), native_root_certs()));
    }

    #[test]
    fn unreadable_pem_bundle_fails() {
        let store = TrustStore::PemFile("/nonexistent/trust-store.pem".into());
        let result = client_config(&store, HostnameVerification::Strict);
        assert!(matches!(result, Err(HttpError::Tls(_))));
    }

    #[test]
    fn pem_bundle_needs_a_certificate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let store = TrustStore::PemFile(file.path().to_path_buf());
        let result = root_store(&store);
        assert!(matches!(result, Err(HttpError::Tls(_))));
    }

    #[test]
    fn native_store_builds_in_either_mode() {
        // Succeeds even on minimal containers without OS roots.
        for mode in [HostnameVerification::Strict, HostnameVerification::AllowAll] {
            assert!(client_config(&TrustStore::Native, mode).is_ok());
        }
    }
}
