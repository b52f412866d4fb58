//! TLS backend adapter contracts and rustls implementation.

use crate::tls::TlsHandshakeConfig;
use crate::transport::BoxedIoStream;
use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use std::net::TcpStream;

#[cfg(feature = "tls-rustls")]
use crate::tls::TlsVersion;
#[cfg(feature = "tls-rustls")]
use rustls::DigitallySignedStruct;
#[cfg(feature = "tls-rustls")]
use rustls::Error as RustlsError;
#[cfg(feature = "tls-rustls")]
use rustls::SignatureScheme;
#[cfg(feature = "tls-rustls")]
use rustls::SupportedProtocolVersion;
#[cfg(feature = "tls-rustls")]
use rustls::client::danger::HandshakeSignatureValid;
#[cfg(feature = "tls-rustls")]
use rustls::client::danger::ServerCertVerified;
#[cfg(feature = "tls-rustls")]
use rustls::client::danger::ServerCertVerifier;
#[cfg(feature = "tls-rustls")]
use rustls::crypto::CryptoProvider;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::CertificateDer;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::UnixTime;
#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

/// Established TLS stream together with the end-entity certificate it presented.
pub struct TlsSession {
    pub stream: BoxedIoStream,
    pub peer_certificate: Option<Vec<u8>>,
}

/// Adapter contract for upgrading TCP transport to TLS.
pub trait TlsBackendAdapter {
    fn connect_tls(
        &self,
        stream: TcpStream,
        handshake: &TlsHandshakeConfig,
    ) -> OrbiterResult<TlsSession>;
}

/// rustls-backed TLS connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustlsTlsAdapter;

#[cfg(feature = "tls-rustls")]
impl TlsBackendAdapter for RustlsTlsAdapter {
    fn connect_tls(
        &self,
        mut stream: TcpStream,
        handshake: &TlsHandshakeConfig,
    ) -> OrbiterResult<TlsSession> {
        use rustls::ClientConfig;
        use rustls::ClientConnection;
        use rustls::StreamOwned;

        let versions = supported_versions(handshake.minimum_version, handshake.maximum_version)?;
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let verifier = Arc::new(DeferredTrustVerifier {
            provider: provider.clone(),
        });

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|error| {
                OrbiterError::new(
                    ErrorKind::Config,
                    "net.tls.config_versions_invalid",
                    format!("failed to configure TLS protocol versions: {error}"),
                )
            })?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        config.enable_sni = handshake.send_sni;

        let server_name = ServerName::try_from(handshake.server_name.clone()).map_err(|error| {
            OrbiterError::new(
                ErrorKind::InvalidUrl,
                "net.tls.server_name_invalid",
                format!(
                    "invalid TLS server name `{}`: {error}",
                    handshake.server_name
                ),
            )
        })?;

        let mut connection =
            ClientConnection::new(Arc::new(config), server_name).map_err(|error| {
                OrbiterError::new(
                    ErrorKind::ConnectionFailed,
                    "net.tls.connection_init_failed",
                    format!(
                        "failed to initialize TLS connection for `{}`: {error}",
                        handshake.server_name
                    ),
                )
            })?;

        connection.complete_io(&mut stream).map_err(|error| {
            OrbiterError::new(
                ErrorKind::ConnectionFailed,
                "net.tls.handshake_failed",
                format!(
                    "TLS handshake failed for `{}`: {error}",
                    handshake.server_name
                ),
            )
        })?;

        let peer_certificate = connection
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|certificate| certificate.as_ref().to_vec());

        let stream = StreamOwned::new(connection, stream);
        Ok(TlsSession {
            stream: Box::new(stream),
            peer_certificate,
        })
    }
}

/// Accepts any chain so the peer certificate reaches TOFU validation;
/// handshake signatures are still verified.
#[cfg(feature = "tls-rustls")]
#[derive(Debug)]
struct DeferredTrustVerifier {
    provider: Arc<CryptoProvider>,
}

#[cfg(feature = "tls-rustls")]
impl ServerCertVerifier for DeferredTrustVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(feature = "tls-rustls")]
fn to_rustls_version(version: TlsVersion) -> &'static SupportedProtocolVersion {
    match version {
        TlsVersion::V1_2 => &rustls::version::TLS12,
        TlsVersion::V1_3 => &rustls::version::TLS13,
    }
}

#[cfg(feature = "tls-rustls")]
fn supported_versions(
    minimum: TlsVersion,
    maximum: TlsVersion,
) -> OrbiterResult<Vec<&'static SupportedProtocolVersion>> {
    let all = [TlsVersion::V1_3, TlsVersion::V1_2];
    let mut versions = Vec::new();

    for version in all {
        if version >= minimum && version <= maximum {
            versions.push(to_rustls_version(version));
        }
    }

    if versions.is_empty() {
        return Err(OrbiterError::new(
            ErrorKind::Config,
            "net.tls.version_set_empty",
            "no supported TLS versions match the requested policy",
        ));
    }

    Ok(versions)
}

#[cfg(not(feature = "tls-rustls"))]
impl TlsBackendAdapter for RustlsTlsAdapter {
    fn connect_tls(
        &self,
        _stream: TcpStream,
        _handshake: &TlsHandshakeConfig,
    ) -> OrbiterResult<TlsSession> {
        Err(OrbiterError::new(
            ErrorKind::ConnectionFailed,
            "net.tls.backend_unavailable",
            "rustls backend is disabled for this build; enable `ob-net/tls-rustls`",
        ))
    }
}
