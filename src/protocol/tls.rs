//! In-band TLS upgrade.
//!
//! When the server's startup response demands it, the plain stream is wrapped in a
//! TLS client session after the `SSL_UPGRADE` greeting. The [`TlsUpgrade`] trait is
//! the seam; [`RustlsUpgrader`] is the implementation used by real connections.
use std::{
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use log::{debug, info, warn};
use rustls::{
    ClientConfig as RustlsClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore,
    SignatureScheme, StreamOwned,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, ring},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime, pem::PemObject},
};
use thiserror::Error;

use super::transport::{Transport, TransportError};
use crate::config::{CertificateVerification, ClientIdentity, TlsConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
    #[error("failed to load {what} from '{path}': {reason}")]
    Credentials {
        what: &'static str,
        path: String,
        reason: String,
    },
    #[error("invalid TLS server name '{0}'")]
    InvalidServerName(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Wraps an established byte stream in an encrypted one.
pub trait TlsUpgrade {
    fn upgrade(&self, stream: Box<dyn Transport>) -> Result<Box<dyn Transport>, TlsError>;
}

/// TLS client built on rustls.
///
/// Credentials are read when the upgrade happens, not when the upgrader is built,
/// so connections to servers that never ask for TLS need no certificate on disk.
#[derive(Debug, Clone)]
pub struct RustlsUpgrader {
    config: TlsConfig,
    server_name: String,
}

impl RustlsUpgrader {
    pub fn new(config: TlsConfig, server_name: &str) -> Self {
        Self {
            config,
            server_name: server_name.to_string(),
        }
    }
}

impl TlsUpgrade for RustlsUpgrader {
    fn upgrade(&self, mut stream: Box<dyn Transport>) -> Result<Box<dyn Transport>, TlsError> {
        let config = client_config(&self.config)?;
        let server_name = ServerName::try_from(self.server_name.clone())
            .map_err(|_| TlsError::InvalidServerName(self.server_name.clone()))?;

        let mut conn = ClientConnection::new(Arc::new(config), server_name)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut stream)?;
        }
        info!(
            "TLS established with {} ({:?})",
            self.server_name,
            conn.protocol_version()
        );

        Ok(Box::new(StreamOwned::new(conn, stream)))
    }
}

impl Transport for StreamOwned<ClientConnection, Box<dyn Transport>> {
    fn shutdown(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        self.flush()?;
        self.sock.shutdown()
    }
}

/// Builds the rustls client configuration for `config`.
pub(crate) fn client_config(config: &TlsConfig) -> Result<RustlsClientConfig, TlsError> {
    let provider = Arc::new(ring::default_provider());
    let builder = RustlsClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let builder = match config.verification {
        CertificateVerification::Strict => {
            builder.with_root_certificates(root_store(config.ca_file.as_deref())?)
        }
        CertificateVerification::SkipVerification => {
            warn!("server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
        }
    };

    match &config.identity {
        Some(identity) => {
            let (certs, key) = load_identity(identity)?;
            Ok(builder.with_client_auth_cert(certs, key)?)
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    match ca_file {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }
            debug!("loaded {} trust anchors from {}", roots.len(), path.display());
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

fn load_identity(
    identity: &ClientIdentity,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let certs = load_certs(&identity.cert)?;
    let key = PrivateKeyDer::from_pem_file(&identity.key).map_err(|e| TlsError::Credentials {
        what: "private key",
        path: identity.key.display().to_string(),
        reason: format!("{e:?}"),
    })?;
    Ok((certs, key))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let failed = |reason: String| TlsError::Credentials {
        what: "certificates",
        path: path.display().to_string(),
        reason,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| failed(format!("{e:?}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| failed(format!("{e:?}")))?;

    if certs.is_empty() {
        return Err(failed("no certificates found".into()));
    }
    Ok(certs)
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
