//! Scheme handlers and the registry the navigator dispatches through.

use crate::frontend::Frontend;
use crate::history::History;
use ob_core::CancelToken;
use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use ob_gemtext::Document;
use ob_net::GeminiClient;
use ob_net::Request;
use ob_net::RequestState;
use ob_net::Response;
use ob_net::dns::DnsResolver;
use ob_net::dns::SystemDnsResolver;
use ob_net::tls_backend::RustlsTlsAdapter;
use ob_net::tls_backend::TlsBackendAdapter;
use ob_net::transport::TcpTransport;
use ob_net::transport::Transport;
use ob_net::url::parse_url;
use ob_security::CertStatus;
use ob_security::CertificateView;
use ob_security::TrustPolicy;
use ob_security::TrustStore;
use ob_security::unix_now;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing::warn;

/// What a handler produced for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// A protocol response still to be branched on by status.
    Response(Response),
    /// Content rendered locally, shown as is.
    Page(Document),
}

/// Navigator state lent to a handler for one fetch.
pub struct FetchContext<'a> {
    pub trust: &'a mut TrustStore,
    pub history: &'a History,
    pub cancel: &'a CancelToken,
    pub frontend: &'a mut dyn Frontend,
}

/// Fetches URLs of one scheme.
pub trait SchemeHandler {
    fn fetch(&self, url: &str, context: &mut FetchContext<'_>) -> OrbiterResult<Fetched>;
}

/// Handlers keyed by lowercase scheme name.
#[derive(Default)]
pub struct SchemeRegistry {
    handlers: BTreeMap<String, Box<dyn SchemeHandler>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `gemini`, `file` and `about` handlers.
    pub fn with_defaults(client: GeminiClient, policy: TrustPolicy) -> Self {
        let mut registry = Self::new();
        registry.register("gemini", GeminiHandler::new(client, policy));
        registry.register("file", FileHandler);
        registry.register("about", AboutHandler);
        registry
    }

    pub fn register(&mut self, scheme: &str, handler: impl SchemeHandler + 'static) {
        self.handlers
            .insert(scheme.to_ascii_lowercase(), Box::new(handler));
    }

    pub fn get(&self, scheme: &str) -> Option<&dyn SchemeHandler> {
        self.handlers
            .get(&scheme.to_ascii_lowercase())
            .map(|handler| handler.as_ref())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().map(String::as_str)
    }
}

/// Network handler applying the trust policy between connect and proceed.
pub struct GeminiHandler<R = SystemDnsResolver, T = TcpTransport, A = RustlsTlsAdapter>
where
    R: DnsResolver,
    T: Transport,
    A: TlsBackendAdapter,
{
    client: GeminiClient<R, T, A>,
    policy: TrustPolicy,
}

impl<R, T, A> GeminiHandler<R, T, A>
where
    R: DnsResolver,
    T: Transport,
    A: TlsBackendAdapter,
{
    pub fn new(client: GeminiClient<R, T, A>, policy: TrustPolicy) -> Self {
        Self { client, policy }
    }
}

impl<R, T, A> SchemeHandler for GeminiHandler<R, T, A>
where
    R: DnsResolver,
    T: Transport,
    A: TlsBackendAdapter,
{
    fn fetch(&self, url: &str, context: &mut FetchContext<'_>) -> OrbiterResult<Fetched> {
        let now = unix_now()?;
        context.frontend.set_status(&format!("Loading {url}"));
        context.cancel.check()?;

        let request = self.client.connect(url, context.trust, now);
        // An interrupt during the handshake must not pin the host or send bytes.
        context.cancel.check()?;
        if !request.state().can_proceed() {
            let state = request.state();
            return Err(request.into_error().unwrap_or_else(|| {
                OrbiterError::internal(
                    "browser.gemini.state_unexplained",
                    format!("connection ended in state `{}`", state.as_str()),
                )
            }));
        }

        let decision = TrustDecision::from_request(&request);
        if let Some(warning) = decision.apply(context.trust, &self.policy, now)? {
            context.frontend.set_status_error(&warning);
        }

        request.proceed(context.cancel).map(Fetched::Response)
    }
}

/// Certificate facts of a connection the caller may proceed with.
#[derive(Debug, Clone, Copy)]
pub struct TrustDecision<'a> {
    pub url: &'a str,
    pub host: &'a str,
    pub state: RequestState,
    pub status: Option<CertStatus>,
    pub certificate: Option<&'a CertificateView>,
}

impl<'a> TrustDecision<'a> {
    pub fn from_request(request: &'a Request) -> Self {
        Self {
            url: request.url(),
            host: request.hostname(),
            state: request.state(),
            status: request.cert_status(),
            certificate: request.certificate(),
        }
    }

    /// Mutates the store as the policy demands.
    ///
    /// Returns a warning to show when proceeding with an invalid certificate.
    pub fn apply(
        &self,
        store: &mut TrustStore,
        policy: &TrustPolicy,
        now: i64,
    ) -> OrbiterResult<Option<String>> {
        match self.state {
            RequestState::UnknownCert => {
                if let Some(certificate) = self.certificate {
                    store.trust_certificate(self.host, certificate, policy.trust_new_permanently);
                }
                Ok(None)
            }
            RequestState::Ok => {
                let renewal = store
                    .get(self.host)
                    .filter(|record| record.is_expired(now))
                    .map(|record| record.persistent);
                if let (Some(persistent), Some(certificate)) = (renewal, self.certificate) {
                    info!(host = self.host, "renewing expired pin");
                    store.trust_certificate(self.host, certificate, persistent);
                }
                Ok(None)
            }
            RequestState::InvalidCert => {
                let reason = self.status.map_or("invalid", CertStatus::as_str);
                if !policy.proceed_on_invalid_certificate {
                    return Err(OrbiterError::new(
                        ErrorKind::InvalidCert,
                        "browser.gemini.cert_invalid",
                        format!("Certificate is not valid: {reason} ({}).", self.url),
                    ));
                }
                warn!(host = self.host, reason, "proceeding with invalid certificate");
                Ok(Some(format!(
                    "Warning: certificate is not valid: {reason} ({}).",
                    self.url
                )))
            }
            state => Err(OrbiterError::internal(
                "browser.gemini.state_not_proceedable",
                format!("cannot proceed from state `{}`", state.as_str()),
            )),
        }
    }
}

/// Local files; `.gmi` and `.gemini` are parsed as gemtext.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHandler;

impl SchemeHandler for FileHandler {
    fn fetch(&self, url: &str, _context: &mut FetchContext<'_>) -> OrbiterResult<Fetched> {
        let path = parse_url(url, false).decoded_path();
        let bytes = fs::read(&path).map_err(|error| {
            OrbiterError::new(
                ErrorKind::Storage,
                "browser.file.read_failed",
                format!("Failed to open file: {error}"),
            )
        })?;

        let text = String::from_utf8_lossy(&bytes);
        let is_gemtext = Path::new(&path)
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| matches!(extension, "gmi" | "gemini"));

        let page = if is_gemtext {
            Document::parse_gemtext(&text)
        } else {
            Document::from_plain_text(&text)
        };
        Ok(Fetched::Page(page))
    }
}

/// Built-in `about:` pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct AboutHandler;

impl SchemeHandler for AboutHandler {
    fn fetch(&self, url: &str, context: &mut FetchContext<'_>) -> OrbiterResult<Fetched> {
        let parts = parse_url(url, false);
        match parts.path.as_str() {
            "history" => Ok(Fetched::Page(Document::parse_gemtext(
                &context.history.to_gemtext(),
            ))),
            "blank" => Ok(Fetched::Page(Document::default())),
            other => Err(OrbiterError::new(
                ErrorKind::UnsupportedScheme,
                "browser.about.page_unknown",
                format!("Unknown page about:{other}."),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AboutHandler;
    use super::FetchContext;
    use super::Fetched;
    use super::FileHandler;
    use super::GeminiHandler;
    use super::SchemeHandler;
    use super::SchemeRegistry;
    use super::TrustDecision;
    use crate::frontend::Frontend;
    use crate::history::History;
    use ob_core::CancelToken;
    use ob_core::ErrorKind;
    use ob_core::OrbiterResult;
    use ob_gemtext::Document;
    use ob_net::ClientOptions;
    use ob_net::GeminiClient;
    use ob_net::RequestState;
    use ob_net::TlsPolicy;
    use ob_net::dns::DnsResolver;
    use ob_net::tls::TlsHandshakeConfig;
    use ob_net::tls_backend::TlsBackendAdapter;
    use ob_net::tls_backend::TlsSession;
    use ob_net::transport::TcpTransport;
    use ob_security::CertStatus;
    use ob_security::CertificateView;
    use ob_security::FingerprintAlgorithm;
    use ob_security::TrustPolicy;
    use ob_security::TrustStore;
    use std::fs;
    use std::io::Read;
    use std::net::SocketAddr;
    use std::net::TcpListener;
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    const NOW: i64 = 1_800_000_000;
    const URL: &str = "gemini://localhost/";
    const LOCALHOST_A: &[u8] = include_bytes!("../../ob-security/fixtures/localhost-a.der");

    #[derive(Default)]
    struct SilentFrontend;

    impl Frontend for SilentFrontend {
        fn load_page(&mut self, _url: &str, _page: &Document) {}
        fn set_status(&mut self, _text: &str) {}
        fn set_status_error(&mut self, _text: &str) {}
        fn prompt(&mut self, _message: &str, _sensitive: bool) -> Option<String> {
            None
        }
    }

    struct LoopbackResolver(SocketAddr);

    impl DnsResolver for LoopbackResolver {
        fn resolve(&self, _host: &str, _port: u16) -> OrbiterResult<Vec<SocketAddr>> {
            Ok(vec![self.0])
        }
    }

    /// Plaintext stand-in whose handshake is interrupted by Ctrl-C.
    struct InterruptedTls {
        cancel: CancelToken,
    }

    impl TlsBackendAdapter for InterruptedTls {
        fn connect_tls(
            &self,
            stream: TcpStream,
            _handshake: &TlsHandshakeConfig,
        ) -> OrbiterResult<TlsSession> {
            self.cancel.cancel();
            Ok(TlsSession {
                stream: Box::new(stream),
                peer_certificate: Some(LOCALHOST_A.to_vec()),
            })
        }
    }

    fn certificate() -> CertificateView {
        match CertificateView::from_der(LOCALHOST_A) {
            Ok(view) => view,
            Err(error) => panic!("{error}"),
        }
    }

    fn decision<'a>(
        state: RequestState,
        status: CertStatus,
        certificate: &'a CertificateView,
    ) -> TrustDecision<'a> {
        TrustDecision {
            url: URL,
            host: "localhost",
            state,
            status: Some(status),
            certificate: Some(certificate),
        }
    }

    #[test]
    fn first_contact_is_pinned_per_policy() {
        let view = certificate();
        let mut store = TrustStore::new();
        let outcome = decision(RequestState::UnknownCert, CertStatus::ValidNew, &view).apply(
            &mut store,
            &TrustPolicy::ephemeral(),
            NOW,
        );

        assert_eq!(outcome, Ok(None));
        let record = match store.get("localhost") {
            Some(record) => record,
            None => panic!("host should be pinned"),
        };
        assert!(!record.persistent);
        assert_eq!(record.expiry, view.not_after);
        assert_eq!(record.fingerprint, view.fingerprint(FingerprintAlgorithm::Sha512));
    }

    #[test]
    fn expired_pin_is_renewed_keeping_persistence() {
        let view = certificate();
        let mut store = TrustStore::new();
        store.trust("localhost", FingerprintAlgorithm::Sha512, "ab", 100, true);

        let outcome = decision(RequestState::Ok, CertStatus::Valid, &view).apply(
            &mut store,
            &TrustPolicy::default(),
            NOW,
        );

        assert_eq!(outcome, Ok(None));
        let record = match store.get("localhost") {
            Some(record) => record,
            None => panic!("host should stay pinned"),
        };
        assert!(record.persistent);
        assert_eq!(record.expiry, view.not_after);
    }

    #[test]
    fn valid_pin_is_left_alone() {
        let view = certificate();
        let mut store = TrustStore::new();
        store.trust_certificate("localhost", &view, false);
        let before = store.clone();

        let outcome = decision(RequestState::Ok, CertStatus::Valid, &view).apply(
            &mut store,
            &TrustPolicy::default(),
            NOW,
        );
        assert_eq!(outcome, Ok(None));
        assert_eq!(store, before);
    }

    #[test]
    fn invalid_certificate_warns_or_aborts_per_policy() {
        let view = certificate();
        let mut store = TrustStore::new();

        let lenient = decision(RequestState::InvalidCert, CertStatus::BadDomain, &view).apply(
            &mut store,
            &TrustPolicy::default(),
            NOW,
        );
        match lenient {
            Ok(Some(warning)) => assert!(warning.contains("bad-domain")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(store.is_empty());

        let strict = TrustPolicy {
            proceed_on_invalid_certificate: false,
            ..TrustPolicy::default()
        };
        let refused = decision(RequestState::InvalidCert, CertStatus::Expired, &view).apply(
            &mut store,
            &strict,
            NOW,
        );
        assert!(refused.is_err());
        if let Err(error) = refused {
            assert!(error.is(ErrorKind::InvalidCert));
        }
    }

    #[test]
    fn about_pages_render_history() {
        let mut history = History::new(10);
        history.push("gemini://a/");
        let mut trust = TrustStore::new();
        let cancel = CancelToken::new();
        let mut frontend = SilentFrontend;
        let mut context = FetchContext {
            trust: &mut trust,
            history: &history,
            cancel: &cancel,
            frontend: &mut frontend,
        };

        match AboutHandler.fetch("about:history", &mut context) {
            Ok(Fetched::Page(page)) => {
                assert_eq!(page.title.as_deref(), Some("History"));
                assert_eq!(page.links.get(1), Some("gemini://a/"));
            }
            other => panic!("unexpected fetch: {other:?}"),
        }

        assert!(matches!(
            AboutHandler.fetch("about:blank", &mut context),
            Ok(Fetched::Page(_))
        ));
        assert!(AboutHandler.fetch("about:nothing", &mut context).is_err());
    }

    #[test]
    fn files_are_parsed_by_extension() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!("orbiter-file-test-{stamp}"));
        if let Err(error) = fs::create_dir_all(&root) {
            panic!("{error}");
        }
        let capsule = root.join("index.gmi");
        let notes = root.join("notes.txt");
        if let Err(error) = fs::write(&capsule, "# Local\n=> gemini://a/").and_then(|()| {
            fs::write(&notes, "=> gemini://a/")
        }) {
            panic!("{error}");
        }

        let history = History::new(10);
        let mut trust = TrustStore::new();
        let cancel = CancelToken::new();
        let mut frontend = SilentFrontend;
        let mut context = FetchContext {
            trust: &mut trust,
            history: &history,
            cancel: &cancel,
            frontend: &mut frontend,
        };

        let gemtext = FileHandler.fetch(&format!("file://{}", capsule.display()), &mut context);
        match gemtext {
            Ok(Fetched::Page(page)) => assert_eq!(page.links.len(), 1),
            other => panic!("unexpected fetch: {other:?}"),
        }

        let plain = FileHandler.fetch(&format!("file://{}", notes.display()), &mut context);
        match plain {
            Ok(Fetched::Page(page)) => assert!(page.links.is_empty()),
            other => panic!("unexpected fetch: {other:?}"),
        }

        let missing = FileHandler.fetch("file:///nonexistent/orbiter.gmi", &mut context);
        assert!(missing.is_err());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn interrupted_handshake_neither_pins_nor_sends() {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(error) => panic!("{error}"),
        };
        let address = match listener.local_addr() {
            Ok(address) => address,
            Err(error) => panic!("{error}"),
        };
        let server = thread::spawn(move || {
            let Ok((mut socket, _)) = listener.accept() else {
                return Vec::new();
            };
            let _ = socket.set_read_timeout(Some(Duration::from_secs(2)));
            let mut received = Vec::new();
            let _ = socket.read_to_end(&mut received);
            received
        });

        let cancel = CancelToken::new();
        let client = GeminiClient::with_parts(
            LoopbackResolver(address),
            TcpTransport,
            InterruptedTls {
                cancel: cancel.clone(),
            },
            TlsPolicy::default(),
            ClientOptions::default(),
        );
        let client = match client {
            Ok(client) => client,
            Err(error) => panic!("{error}"),
        };
        let handler = GeminiHandler::new(client, TrustPolicy::default());

        let history = History::new(10);
        let mut trust = TrustStore::new();
        let mut frontend = SilentFrontend;
        let mut context = FetchContext {
            trust: &mut trust,
            history: &history,
            cancel: &cancel,
            frontend: &mut frontend,
        };

        let fetched = handler.fetch(URL, &mut context);
        assert!(fetched.is_err());
        if let Err(error) = fetched {
            assert!(error.is(ErrorKind::Cancelled));
        }
        assert!(trust.is_empty());

        let received = match server.join() {
            Ok(received) => received,
            Err(_) => panic!("server thread panicked"),
        };
        assert!(received.is_empty());
    }

    #[test]
    fn registry_lookup_ignores_case() {
        let mut registry = SchemeRegistry::new();
        registry.register("About", AboutHandler);
        assert!(registry.get("ABOUT").is_some());
        assert!(registry.get("gopher").is_none());
        assert_eq!(registry.schemes().collect::<Vec<_>>(), vec!["about"]);
    }
}
