//! Protocol client: one connection attempt per request.

use crate::dns::DnsResolver;
use crate::dns::SystemDnsResolver;
use crate::protocol::MAX_HEADER_BYTES;
use crate::protocol::MAX_REQUEST_BYTES;
use crate::protocol::Response;
use crate::protocol::build_request;
use crate::protocol::find_line_end;
use crate::tls::TlsPolicy;
use crate::tls_backend::RustlsTlsAdapter;
use crate::tls_backend::TlsBackendAdapter;
use crate::transport::BoxedIoStream;
use crate::transport::TcpTransport;
use crate::transport::Transport;
use crate::url::DEFAULT_PORT;
use crate::url::parse_url;
use ob_core::CancelToken;
use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use ob_security::CertStatus;
use ob_security::CertificateView;
use ob_security::TrustStore;
use ob_security::validate_certificate;
use std::io::ErrorKind as IoErrorKind;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;
use tracing::warn;

/// Timeouts and limits applied to every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Idle time after which a silent peer is given up on.
    pub read_timeout: Duration,
    /// Socket wake-up period used to notice cancellation.
    pub poll_interval: Duration,
    pub max_request_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            max_request_bytes: MAX_REQUEST_BYTES,
        }
    }
}

/// Progress of a connection attempt.
///
/// `InvalidUrl`, `ConnectionFailed`, `ErrorCert` and `UntrustedCert` abort
/// the attempt; `InvalidCert`, `UnknownCert` and `Ok` leave it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Init,
    InvalidUrl,
    ConnectionFailed,
    ErrorCert,
    UntrustedCert,
    InvalidCert,
    UnknownCert,
    Ok,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::InvalidUrl => "invalid-url",
            Self::ConnectionFailed => "connection-failed",
            Self::ErrorCert => "error-cert",
            Self::UntrustedCert => "untrusted-cert",
            Self::InvalidCert => "invalid-cert",
            Self::UnknownCert => "unknown-cert",
            Self::Ok => "ok",
        }
    }

    pub fn can_proceed(self) -> bool {
        matches!(self, Self::InvalidCert | Self::UnknownCert | Self::Ok)
    }
}

/// A connection attempt waiting for the caller's decision.
///
/// Dropping it closes the socket.
pub struct Request {
    url: String,
    hostname: String,
    state: RequestState,
    payload: Vec<u8>,
    error: Option<OrbiterError>,
    cert_status: Option<CertStatus>,
    certificate: Option<CertificateView>,
    stream: Option<BoxedIoStream>,
    read_timeout: Duration,
}

impl Request {
    fn new(url: &str, options: &ClientOptions) -> Self {
        Self {
            url: url.to_owned(),
            hostname: String::new(),
            state: RequestState::Init,
            payload: Vec::new(),
            error: None,
            cert_status: None,
            certificate: None,
            stream: None,
            read_timeout: options.read_timeout,
        }
    }

    fn fail(mut self, state: RequestState, error: OrbiterError) -> Self {
        debug!(url = self.url.as_str(), state = state.as_str(), %error, "request aborted");
        self.state = state;
        self.error = Some(error);
        self.stream = None;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn error(&self) -> Option<&OrbiterError> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<OrbiterError> {
        self.error
    }

    pub fn cert_status(&self) -> Option<CertStatus> {
        self.cert_status
    }

    pub fn certificate(&self) -> Option<&CertificateView> {
        self.certificate.as_ref()
    }

    /// Sends the request line and reads until the peer closes or goes idle.
    pub fn proceed(mut self, cancel: &CancelToken) -> OrbiterResult<Response> {
        if !self.state.can_proceed() {
            return Err(self.error.take().unwrap_or_else(|| {
                OrbiterError::internal(
                    "net.client.not_connected",
                    format!("cannot proceed from state `{}`", self.state.as_str()),
                )
            }));
        }

        let mut stream = self.stream.take().ok_or_else(|| {
            OrbiterError::internal("net.client.stream_missing", "connection already consumed")
        })?;

        cancel.check()?;
        stream.write_all(&self.payload).map_err(|error| {
            connection_failed(&self.url, "net.client.write_failed", &error.to_string())
        })?;
        stream.flush().map_err(|error| {
            connection_failed(&self.url, "net.client.flush_failed", &error.to_string())
        })?;

        let data = read_response(&mut *stream, self.read_timeout, cancel, &self.url)?;
        drop(stream);

        Response::parse(&data).map_err(|error| {
            debug!(url = self.url.as_str(), %error, "response rejected");
            OrbiterError::new(
                ErrorKind::ParseError,
                error.code,
                format!("Server response parsing failed ({}).", self.url),
            )
        })
    }
}

/// Client with pluggable resolver, transport and TLS backend.
pub struct GeminiClient<R = SystemDnsResolver, T = TcpTransport, A = RustlsTlsAdapter>
where
    R: DnsResolver,
    T: Transport,
    A: TlsBackendAdapter,
{
    dns: R,
    transport: T,
    tls_adapter: A,
    tls_policy: TlsPolicy,
    options: ClientOptions,
}

impl GeminiClient {
    pub fn new(tls_policy: TlsPolicy, options: ClientOptions) -> OrbiterResult<Self> {
        Self::with_parts(
            SystemDnsResolver,
            TcpTransport,
            RustlsTlsAdapter,
            tls_policy,
            options,
        )
    }
}

impl<R, T, A> GeminiClient<R, T, A>
where
    R: DnsResolver,
    T: Transport,
    A: TlsBackendAdapter,
{
    pub fn with_parts(
        dns: R,
        transport: T,
        tls_adapter: A,
        tls_policy: TlsPolicy,
        options: ClientOptions,
    ) -> OrbiterResult<Self> {
        tls_policy.validate()?;
        Ok(Self {
            dns,
            transport,
            tls_adapter,
            tls_policy,
            options,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Opens a TLS connection to `url` and classifies the peer certificate.
    ///
    /// The returned request is in an abort state with its socket closed, or
    /// in a state from which [`Request::proceed`] may be called.
    pub fn connect(&self, url: &str, store: &TrustStore, now: i64) -> Request {
        let mut request = Request::new(url, &self.options);
        let parts = parse_url(url, false);

        if parts.scheme() != Some("gemini") {
            let error = OrbiterError::new(
                ErrorKind::InvalidUrl,
                "net.client.scheme_invalid",
                format!("Invalid URL ({url})."),
            );
            return request.fail(RequestState::InvalidUrl, error);
        }

        let (host, port) = match parts.host_and_port(DEFAULT_PORT) {
            Ok(value) => value,
            Err(error) => {
                let error = OrbiterError::new(
                    ErrorKind::InvalidUrl,
                    error.code,
                    format!("Invalid URL ({url}): {}", error.message),
                );
                return request.fail(RequestState::InvalidUrl, error);
            }
        };
        request.hostname = host.clone();

        request.payload = match build_request(url, self.options.max_request_bytes) {
            Ok(payload) => payload,
            Err(error) => {
                let error = OrbiterError::new(
                    ErrorKind::InvalidUrl,
                    error.code,
                    format!("Invalid URL ({url}): {}", error.message),
                );
                return request.fail(RequestState::InvalidUrl, error);
            }
        };

        let handshake = match self.tls_policy.handshake_config_for(&host) {
            Ok(handshake) => handshake,
            Err(error) => return request.fail(RequestState::InvalidUrl, error),
        };

        debug!(url, host = host.as_str(), port, "connecting");
        let stream = match self
            .dns
            .resolve(&host, port)
            .and_then(|addresses| {
                connect_first_available(&self.transport, &addresses, self.options.connect_timeout)
            }) {
            Ok(stream) => stream,
            Err(error) => {
                let error = connection_failed(url, error.code, &error.message);
                return request.fail(RequestState::ConnectionFailed, error);
            }
        };

        // Shares the socket so the read timeout can change after the handshake.
        let control = stream.try_clone().ok();

        let session = match self.tls_adapter.connect_tls(stream, &handshake) {
            Ok(session) => session,
            Err(error) => {
                let error = connection_failed(url, error.code, &error.message);
                return request.fail(RequestState::ConnectionFailed, error);
            }
        };

        let validation =
            validate_certificate(session.peer_certificate.as_deref(), &host, store, now);
        request.cert_status = Some(validation.status);
        request.certificate = validation.certificate;

        let state = match validation.status {
            CertStatus::Error => {
                let error = OrbiterError::new(
                    ErrorKind::ErrorCert,
                    "net.client.cert_error",
                    format!("Certificate was missing or corrupt ({url})."),
                );
                return request.fail(RequestState::ErrorCert, error);
            }
            CertStatus::WrongFingerprint => {
                let error = OrbiterError::new(
                    ErrorKind::UntrustedCert,
                    "net.client.cert_untrusted",
                    format!("Certificate has been changed ({url})."),
                );
                return request.fail(RequestState::UntrustedCert, error);
            }
            CertStatus::NotValidYet | CertStatus::Expired | CertStatus::BadDomain => {
                RequestState::InvalidCert
            }
            CertStatus::ValidNew => RequestState::UnknownCert,
            CertStatus::Valid => RequestState::Ok,
        };

        if let Some(control) = control {
            if let Err(error) = control.set_read_timeout(Some(self.options.poll_interval)) {
                warn!(url, %error, "failed to shorten read timeout; cancellation may lag");
            }
        }

        request.state = state;
        request.stream = Some(session.stream);
        request
    }
}

fn connect_first_available<T: Transport>(
    transport: &T,
    addresses: &[SocketAddr],
    timeout: Duration,
) -> OrbiterResult<TcpStream> {
    let mut last_error: Option<OrbiterError> = None;

    for address in addresses {
        match transport.connect(*address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                debug!(%address, %error, "connection attempt failed");
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Err(error),
        None => Err(OrbiterError::new(
            ErrorKind::ConnectionFailed,
            "net.transport.no_addresses",
            "no addresses available to open a connection",
        )),
    }
}

/// Collects response bytes until close; a header-less idle timeout is fatal.
fn read_response<S: Read + ?Sized>(
    stream: &mut S,
    idle_timeout: Duration,
    cancel: &CancelToken,
    url: &str,
) -> OrbiterResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let mut header_complete = false;
    let mut last_progress = Instant::now();

    loop {
        cancel.check()?;

        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                buffer.extend_from_slice(&chunk[..read]);
                last_progress = Instant::now();

                if !header_complete {
                    if find_line_end(&buffer).is_some() {
                        header_complete = true;
                    } else if buffer.len() > MAX_HEADER_BYTES {
                        return Err(OrbiterError::new(
                            ErrorKind::ParseError,
                            "net.client.header_too_long",
                            format!("Server response parsing failed ({url})."),
                        ));
                    }
                }
            }
            Err(error)
                if matches!(error.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) =>
            {
                if last_progress.elapsed() < idle_timeout {
                    continue;
                }

                if header_complete {
                    warn!(url, bytes = buffer.len(), "peer went idle, keeping partial body");
                    break;
                }

                return Err(OrbiterError::new(
                    ErrorKind::NoResponse,
                    "net.client.no_response",
                    format!("Server did not respond in time ({url})."),
                ));
            }
            Err(error) if error.kind() == IoErrorKind::Interrupted => continue,
            // Peers commonly close without a TLS close_notify.
            Err(error) if error.kind() == IoErrorKind::UnexpectedEof => break,
            Err(error) => {
                return Err(connection_failed(
                    url,
                    "net.client.read_failed",
                    &error.to_string(),
                ));
            }
        }
    }

    Ok(buffer)
}

fn connection_failed(url: &str, code: &'static str, detail: &str) -> OrbiterError {
    OrbiterError::new(
        ErrorKind::ConnectionFailed,
        code,
        format!("Connection failed ({url}): {detail}"),
    )
}
