//! Navigation orchestrator: URL resolution, dispatch and status handling.

use crate::cache::PageCache;
use crate::content::Content;
use crate::content::interpret;
use crate::frontend::Frontend;
use crate::history::History;
use crate::links::CaptureStep;
use crate::links::KeyInput;
use crate::links::LinkCapture;
use crate::schemes::FetchContext;
use crate::schemes::Fetched;
use crate::schemes::SchemeRegistry;
use ob_core::CancelToken;
use ob_core::ErrorKind;
use ob_core::LinkTable;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use ob_gemtext::Document;
use ob_net::Response;
use ob_net::StatusClass;
use ob_net::StatusCode;
use ob_net::url::DEFAULT_SCHEME;
use ob_net::url::get_parent_url;
use ob_net::url::get_root_url;
use ob_net::url::join_url;
use ob_net::url::parse_url;
use ob_net::url::sanitize_url;
use ob_net::url::set_parameter;
use ob_security::TrustStore;
use ob_storage::StorageManager;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;

/// Redirections followed for one navigation before giving up.
pub const MAX_REDIRECTS: u32 = 5;

/// Navigator settings that do not belong to a single crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    pub history_limit: usize,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            history_limit: 1000,
        }
    }
}

/// Parameters of one [`Navigator::open`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// URL that relative input is resolved against instead of the current one.
    pub base: Option<String>,
    pub redirects: u32,
    /// Read the input as absolute even when a page is loaded.
    pub assume_absolute: bool,
    /// Push the previous URL to history on success.
    pub history: bool,
    pub use_cache: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            base: None,
            redirects: 0,
            assume_absolute: false,
            history: true,
            use_cache: true,
        }
    }
}

impl OpenOptions {
    pub fn absolute() -> Self {
        Self {
            assume_absolute: true,
            ..Self::default()
        }
    }
}

/// How an [`Navigator::open`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// A page was rendered at `url` after following `redirects` redirections.
    Loaded { url: String, redirects: u32 },
    Downloaded { url: String, path: PathBuf },
    /// The user dismissed a prompt; nothing changed.
    Dismissed,
    /// The error was already shown through the frontend.
    Failed(OrbiterError),
}

/// Session state and the operations a user can trigger on it.
pub struct Navigator<F: Frontend> {
    frontend: F,
    registry: SchemeRegistry,
    storage: StorageManager,
    trust: TrustStore,
    history: History,
    cache: PageCache,
    cancel: CancelToken,
    current_url: Option<String>,
    current_page: Option<Document>,
}

impl<F: Frontend> Navigator<F> {
    pub fn new(
        frontend: F,
        registry: SchemeRegistry,
        storage: StorageManager,
        trust: TrustStore,
        options: &BrowserOptions,
    ) -> Self {
        Self {
            frontend,
            registry,
            storage,
            trust,
            history: History::new(options.history_limit),
            cache: PageCache::new(),
            cancel: CancelToken::new(),
            current_url: None,
            current_page: None,
        }
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Token shared with whatever delivers interrupts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn set_current_url(&mut self, url: Option<String>) {
        if let Some(url) = &url {
            self.frontend.set_status(url);
        }
        self.current_url = url;
    }

    /// Links of the page on screen, if any.
    pub fn current_links(&self) -> Option<&LinkTable> {
        self.current_page.as_ref().map(|page| &page.links)
    }

    /// Opens `url`; failures are shown through the frontend and returned.
    pub fn open(&mut self, url: &str, options: OpenOptions) -> NavigationOutcome {
        self.cancel.reset();
        match self.navigate(url, options) {
            Ok(outcome) => outcome,
            Err(error) => self.fail(error),
        }
    }

    /// Reopens the current URL, bypassing the cache and history.
    pub fn reload(&mut self) -> Option<NavigationOutcome> {
        let url = self.current_url.clone()?;
        Some(self.open(
            &url,
            OpenOptions {
                assume_absolute: true,
                history: false,
                use_cache: false,
                ..OpenOptions::default()
            },
        ))
    }

    pub fn go_back(&mut self) -> Option<NavigationOutcome> {
        let url = self.history.pop()?;
        Some(self.open(
            &url,
            OpenOptions {
                assume_absolute: true,
                history: false,
                ..OpenOptions::default()
            },
        ))
    }

    pub fn go_to_parent(&mut self) -> Option<NavigationOutcome> {
        let url = get_parent_url(self.current_url.as_deref()?);
        Some(self.open(&url, OpenOptions::absolute()))
    }

    pub fn go_to_root(&mut self) -> Option<NavigationOutcome> {
        let url = get_root_url(self.current_url.as_deref()?);
        Some(self.open(&url, OpenOptions::absolute()))
    }

    /// Follows link `id` of the current page.
    pub fn open_link(&mut self, id: u32) -> NavigationOutcome {
        let target = self
            .current_links()
            .and_then(|links| links.get(id))
            .map(str::to_owned);

        match target {
            Some(url) => self.open(&url, OpenOptions::default()),
            None => self.fail(OrbiterError::new(
                ErrorKind::UnknownLink,
                "navigation.link_unknown",
                format!("Unknown link ID {id}."),
            )),
        }
    }

    /// Selects a link from typed digits.
    ///
    /// `keys` follow `first_digit`; running out of keys submits the input.
    pub fn handle_digit<I>(&mut self, first_digit: u8, keys: I) -> NavigationOutcome
    where
        I: IntoIterator<Item = KeyInput>,
    {
        let Some(links) = self.current_links().cloned() else {
            return NavigationOutcome::Dismissed;
        };

        let mut keys = keys.into_iter();
        let (mut capture, mut step) = LinkCapture::begin(first_digit, &links);
        let id = loop {
            match step {
                CaptureStep::Continue => {
                    let key = keys.next().unwrap_or(KeyInput::Submit);
                    step = capture.feed(key, &links);
                }
                CaptureStep::Resolved(id) => break id,
                CaptureStep::Cancelled => return NavigationOutcome::Dismissed,
                CaptureStep::Invalid(message) => {
                    return self.fail(OrbiterError::new(
                        ErrorKind::UnknownLink,
                        "navigation.link_invalid",
                        message,
                    ));
                }
            }
        };

        self.open_link(id)
    }

    /// Writes persistent pins back to disk.
    pub fn shutdown(&self) -> OrbiterResult<()> {
        self.storage.save_trust_store(&self.trust)
    }

    fn fail(&mut self, error: OrbiterError) -> NavigationOutcome {
        debug!(code = error.code, kind = error.kind.as_str(), "navigation failed");
        self.frontend.set_status_error(&error.message);
        NavigationOutcome::Failed(error)
    }

    fn navigate(&mut self, url: &str, options: OpenOptions) -> OrbiterResult<NavigationOutcome> {
        if options.redirects > MAX_REDIRECTS {
            return Err(OrbiterError::new(
                ErrorKind::TooManyRedirects,
                "navigation.redirects_exceeded",
                format!("Too many redirections ({url})."),
            ));
        }

        let target = self.resolve(url, &options);
        let scheme = parse_url(&target, false)
            .scheme
            .unwrap_or_else(|| DEFAULT_SCHEME.to_owned());

        if options.use_cache {
            if let Some(page) = self.cache.get(&target).cloned() {
                debug!(url = target.as_str(), "cache hit");
                self.show_page(&target, page, options.history, false);
                return Ok(NavigationOutcome::Loaded {
                    url: target,
                    redirects: options.redirects,
                });
            }
        }

        let handler = self.registry.get(&scheme).ok_or_else(|| {
            OrbiterError::new(
                ErrorKind::UnsupportedScheme,
                "navigation.scheme_unsupported",
                format!("Protocol {scheme} not supported."),
            )
        })?;

        let mut context = FetchContext {
            trust: &mut self.trust,
            history: &self.history,
            cancel: &self.cancel,
            frontend: &mut self.frontend,
        };
        let fetched = handler.fetch(&target, &mut context)?;

        match fetched {
            Fetched::Page(page) => {
                self.show_page(&target, page, options.history, false);
                Ok(NavigationOutcome::Loaded {
                    url: target,
                    redirects: options.redirects,
                })
            }
            Fetched::Response(response) => self.handle_response(target, response, options),
        }
    }

    fn resolve(&self, url: &str, options: &OpenOptions) -> String {
        let base = options.base.as_deref().or(self.current_url.as_deref());
        match base {
            Some(base) if !options.assume_absolute => sanitize_url(&join_url(base, url), false),
            _ => sanitize_url(url, true),
        }
    }

    fn handle_response(
        &mut self,
        target: String,
        response: Response,
        options: OpenOptions,
    ) -> OrbiterResult<NavigationOutcome> {
        let status = response.status;
        match status.class() {
            StatusClass::Success => {
                let url_path = parse_url(&target, false).decoded_path();
                match interpret(&response, &url_path, &self.storage)? {
                    Content::Page(page) => {
                        self.show_page(&target, page, options.history, true);
                        Ok(NavigationOutcome::Loaded {
                            url: target,
                            redirects: options.redirects,
                        })
                    }
                    Content::Downloaded(path) => {
                        self.frontend
                            .set_status(&format!("Downloaded {target} to {}.", path.display()));
                        Ok(NavigationOutcome::Downloaded { url: target, path })
                    }
                }
            }
            StatusClass::Redirect if !response.meta.is_empty() => {
                info!(from = target.as_str(), to = response.meta.as_str(), "following redirect");
                self.navigate(
                    &response.meta,
                    OpenOptions {
                        base: Some(target),
                        redirects: options.redirects + 1,
                        assume_absolute: false,
                        ..options
                    },
                )
            }
            StatusClass::TemporaryFailure | StatusClass::PermanentFailure => {
                let detail = if response.meta.is_empty() {
                    status.name().unwrap_or("unknown error")
                } else {
                    response.meta.as_str()
                };
                Err(OrbiterError::new(
                    ErrorKind::ServerError,
                    "navigation.server_error",
                    format!("Server error: {detail}"),
                ))
            }
            StatusClass::Input => self.request_input(&target, &response, options),
            _ => Err(OrbiterError::new(
                ErrorKind::UnhandledStatus,
                "navigation.status_unhandled",
                format!("Unhandled response code {}", status.as_u8()),
            )),
        }
    }

    fn request_input(
        &mut self,
        target: &str,
        response: &Response,
        options: OpenOptions,
    ) -> OrbiterResult<NavigationOutcome> {
        let sensitive = response.status == StatusCode::SENSITIVE_INPUT;
        if response.meta.is_empty() {
            self.frontend.set_status("Input needed:");
        } else {
            self.frontend
                .set_status(&format!("Input needed: {}", response.meta));
        }

        match self.frontend.prompt(&response.meta, sensitive) {
            Some(text) if !text.is_empty() => {
                let url = set_parameter(target, &text);
                self.navigate(
                    &url,
                    OpenOptions {
                        base: None,
                        assume_absolute: true,
                        use_cache: false,
                        ..options
                    },
                )
            }
            _ => Ok(NavigationOutcome::Dismissed),
        }
    }

    fn show_page(&mut self, url: &str, page: Document, push_history: bool, cache: bool) {
        if push_history {
            if let Some(previous) = &self.current_url {
                self.history.push(previous);
            }
        }

        self.frontend.load_page(url, &page);
        if cache {
            self.cache.insert(url, page.clone());
        }
        self.current_page = Some(page);
        self.current_url = Some(url.to_owned());
        self.frontend.set_status(url);
    }
}

#[cfg(test)]
mod tests {
    use super::BrowserOptions;
    use super::NavigationOutcome;
    use super::Navigator;
    use super::OpenOptions;
    use crate::frontend::Frontend;
    use crate::links::KeyInput;
    use crate::schemes::FetchContext;
    use crate::schemes::Fetched;
    use crate::schemes::SchemeHandler;
    use crate::schemes::SchemeRegistry;
    use ob_core::ErrorKind;
    use ob_core::OrbiterError;
    use ob_core::OrbiterResult;
    use ob_gemtext::Document;
    use ob_net::Response;
    use ob_security::TrustStore;
    use ob_storage::StorageConfig;
    use ob_storage::StorageManager;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::collections::VecDeque;
    use std::fs;
    use std::rc::Rc;
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    const HOME: &str = "gemini://capsule.test/dir/index.gmi";

    /// Serves canned raw responses and records every URL fetched.
    struct FakeCapsule {
        replies: BTreeMap<String, Vec<u8>>,
        fetched: Rc<RefCell<Vec<String>>>,
    }

    impl SchemeHandler for FakeCapsule {
        fn fetch(&self, url: &str, _context: &mut FetchContext<'_>) -> OrbiterResult<Fetched> {
            self.fetched.borrow_mut().push(url.to_owned());
            let raw = self.replies.get(url).ok_or_else(|| {
                OrbiterError::new(
                    ErrorKind::ConnectionFailed,
                    "test.capsule.unknown_url",
                    format!("Connection failed ({url})."),
                )
            })?;
            Response::parse(raw).map(Fetched::Response)
        }
    }

    /// Gets interrupted while the attempt is in flight.
    struct InterruptedCapsule;

    impl SchemeHandler for InterruptedCapsule {
        fn fetch(&self, _url: &str, context: &mut FetchContext<'_>) -> OrbiterResult<Fetched> {
            context.cancel.cancel();
            context.cancel.check()?;
            Response::parse(b"20 text/gemini\r\nunreachable\n").map(Fetched::Response)
        }
    }

    #[derive(Default)]
    struct RecordingFrontend {
        loaded: Vec<String>,
        statuses: Vec<String>,
        errors: Vec<String>,
        prompts: Vec<(String, bool)>,
        answers: VecDeque<Option<String>>,
    }

    impl Frontend for RecordingFrontend {
        fn load_page(&mut self, url: &str, _page: &Document) {
            self.loaded.push(url.to_owned());
        }

        fn set_status(&mut self, text: &str) {
            self.statuses.push(text.to_owned());
        }

        fn set_status_error(&mut self, text: &str) {
            self.errors.push(text.to_owned());
        }

        fn prompt(&mut self, message: &str, sensitive: bool) -> Option<String> {
            self.prompts.push((message.to_owned(), sensitive));
            self.answers.pop_front().flatten()
        }
    }

    struct Harness {
        navigator: Navigator<RecordingFrontend>,
        fetched: Rc<RefCell<Vec<String>>>,
    }

    fn harness(replies: &[(&str, &str)]) -> Harness {
        harness_with_storage(replies, StorageManager::new(StorageConfig::default()))
    }

    fn harness_with_storage(replies: &[(&str, &str)], storage: StorageManager) -> Harness {
        let fetched = Rc::new(RefCell::new(Vec::new()));
        let capsule = FakeCapsule {
            replies: replies
                .iter()
                .map(|(url, raw)| ((*url).to_owned(), raw.as_bytes().to_vec()))
                .collect(),
            fetched: Rc::clone(&fetched),
        };

        let mut registry = SchemeRegistry::new();
        registry.register("gemini", capsule);
        let navigator = Navigator::new(
            RecordingFrontend::default(),
            registry,
            storage,
            TrustStore::new(),
            &BrowserOptions::default(),
        );
        Harness { navigator, fetched }
    }

    fn fetch_count(harness: &Harness) -> usize {
        harness.fetched.borrow().len()
    }

    fn loaded(url: &str, redirects: u32) -> NavigationOutcome {
        NavigationOutcome::Loaded {
            url: url.to_owned(),
            redirects,
        }
    }

    fn last_error(harness: &Harness) -> Option<&str> {
        harness.navigator.frontend().errors.last().map(String::as_str)
    }

    #[test]
    fn first_page_is_read_as_absolute() {
        let mut harness = harness(&[(HOME, "20 text/gemini\r\n# Home\n")]);

        let outcome = harness
            .navigator
            .open("capsule.test/dir/index.gmi", OpenOptions::default());

        assert_eq!(outcome, loaded(HOME, 0));
        assert_eq!(harness.navigator.current_url(), Some(HOME));
        assert!(harness.navigator.history().is_empty());
        assert_eq!(harness.navigator.frontend().loaded, vec![HOME.to_owned()]);
    }

    #[test]
    fn relative_input_joins_current_url_and_pushes_previous() {
        let mut harness = harness(&[
            (HOME, "20 text/gemini\r\n=> ../top.gmi Top\n"),
            ("gemini://capsule.test/top.gmi", "20 text/gemini\r\ntop\n"),
        ]);

        harness.navigator.open(HOME, OpenOptions::default());
        let outcome = harness.navigator.open("../top.gmi", OpenOptions::default());

        assert_eq!(outcome, loaded("gemini://capsule.test/top.gmi", 0));
        assert_eq!(
            harness.navigator.history().recent().collect::<Vec<_>>(),
            vec![HOME]
        );
    }

    #[test]
    fn cached_pages_skip_the_network_but_update_history() {
        let mut harness = harness(&[
            (HOME, "20 text/gemini\r\nhome\n"),
            ("gemini://capsule.test/other", "20 text/gemini\r\nother\n"),
        ]);

        harness.navigator.open(HOME, OpenOptions::default());
        harness
            .navigator
            .open("gemini://capsule.test/other", OpenOptions::default());
        let outcome = harness.navigator.open(HOME, OpenOptions::default());

        assert_eq!(outcome, loaded(HOME, 0));
        assert_eq!(fetch_count(&harness), 2);
        assert_eq!(harness.navigator.history().len(), 2);
        assert_eq!(harness.navigator.cache().len(), 2);
    }

    #[test]
    fn reload_bypasses_cache_and_history() {
        let mut harness = harness(&[(HOME, "20 text/gemini\r\nhome\n")]);

        harness.navigator.open(HOME, OpenOptions::default());
        let outcome = harness.navigator.reload();

        assert_eq!(outcome, Some(loaded(HOME, 0)));
        assert_eq!(fetch_count(&harness), 2);
        assert!(harness.navigator.history().is_empty());
    }

    #[test]
    fn go_back_pops_without_pushing() {
        let mut harness = harness(&[
            (HOME, "20 text/gemini\r\nhome\n"),
            ("gemini://capsule.test/next", "20 text/gemini\r\nnext\n"),
        ]);

        assert_eq!(harness.navigator.go_back(), None);
        harness.navigator.open(HOME, OpenOptions::default());
        harness.navigator.open("/next", OpenOptions::default());

        assert_eq!(harness.navigator.go_back(), Some(loaded(HOME, 0)));
        assert!(harness.navigator.history().is_empty());
        assert_eq!(harness.navigator.current_url(), Some(HOME));
    }

    #[test]
    fn parent_and_root_derive_from_current_url() {
        let mut harness = harness(&[
            ("gemini://capsule.test/a/b/", "20 text/gemini\r\nb\n"),
            ("gemini://capsule.test/a/", "20 text/gemini\r\na\n"),
            ("gemini://capsule.test/", "20 text/gemini\r\nroot\n"),
        ]);

        assert_eq!(harness.navigator.go_to_parent(), None);
        harness
            .navigator
            .open("gemini://capsule.test/a/b/", OpenOptions::default());

        assert_eq!(
            harness.navigator.go_to_parent(),
            Some(loaded("gemini://capsule.test/a/", 0))
        );
        assert_eq!(
            harness.navigator.go_to_root(),
            Some(loaded("gemini://capsule.test/", 0))
        );
    }

    #[test]
    fn redirects_resolve_against_the_redirecting_url() {
        let mut harness = harness(&[
            ("gemini://capsule.test/old/page", "30 ../new/page\r\n"),
            ("gemini://capsule.test/new/page", "20 text/gemini\r\nmoved\n"),
        ]);

        let outcome = harness
            .navigator
            .open("gemini://capsule.test/old/page", OpenOptions::default());

        assert_eq!(outcome, loaded("gemini://capsule.test/new/page", 1));
        assert_eq!(fetch_count(&harness), 2);
    }

    #[test]
    fn redirect_chains_stop_after_five_hops() {
        let replies: Vec<(String, String)> = (0..10)
            .map(|hop| {
                (
                    format!("gemini://capsule.test/r{hop}"),
                    format!("30 /r{}\r\n", hop + 1),
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = replies
            .iter()
            .map(|(url, raw)| (url.as_str(), raw.as_str()))
            .collect();
        let mut harness = harness(&borrowed);

        let outcome = harness
            .navigator
            .open("gemini://capsule.test/r0", OpenOptions::default());

        match outcome {
            NavigationOutcome::Failed(error) => {
                assert!(error.is(ErrorKind::TooManyRedirects));
                assert_eq!(error.message, "Too many redirections (/r6).");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fetch_count(&harness), 6);
        assert_eq!(harness.navigator.current_url(), None);
    }

    #[test]
    fn failure_classes_surface_meta_or_code_name() {
        let mut harness = harness(&[
            ("gemini://capsule.test/busy", "44 come back in 60s\r\n"),
            ("gemini://capsule.test/missing", "51 \r\n"),
        ]);

        harness
            .navigator
            .open("gemini://capsule.test/busy", OpenOptions::default());
        assert_eq!(last_error(&harness), Some("Server error: come back in 60s"));

        harness
            .navigator
            .open("gemini://capsule.test/missing", OpenOptions::default());
        assert_eq!(last_error(&harness), Some("Server error: not found"));
    }

    #[test]
    fn unhandled_codes_and_schemes_are_reported() {
        let mut harness = harness(&[("gemini://capsule.test/cert", "60 need a cert\r\n")]);

        harness
            .navigator
            .open("gemini://capsule.test/cert", OpenOptions::default());
        assert_eq!(last_error(&harness), Some("Unhandled response code 60"));

        let outcome = harness
            .navigator
            .open("gopher://hole.test/", OpenOptions::absolute());
        assert!(matches!(outcome, NavigationOutcome::Failed(ref error) if error.is(ErrorKind::UnsupportedScheme)));
        assert_eq!(last_error(&harness), Some("Protocol gopher not supported."));
    }

    #[test]
    fn input_requests_reissue_with_query() {
        let mut harness = harness(&[
            ("gemini://capsule.test/search", "10 Search terms?\r\n"),
            (
                "gemini://capsule.test/search?hello%20world",
                "20 text/gemini\r\nresults\n",
            ),
            ("gemini://capsule.test/login", "11 Password\r\n"),
        ]);
        harness
            .navigator
            .frontend_mut()
            .answers
            .extend([Some("hello world".to_owned()), None]);

        let outcome = harness
            .navigator
            .open("gemini://capsule.test/search", OpenOptions::default());
        assert_eq!(
            outcome,
            loaded("gemini://capsule.test/search?hello%20world", 0)
        );

        let outcome = harness
            .navigator
            .open("gemini://capsule.test/login", OpenOptions::default());
        assert_eq!(outcome, NavigationOutcome::Dismissed);
        assert_eq!(
            harness.navigator.frontend().prompts,
            vec![
                ("Search terms?".to_owned(), false),
                ("Password".to_owned(), true)
            ]
        );
    }

    #[test]
    fn links_open_by_id_or_report_unknown_ids() {
        let mut harness = harness(&[
            (HOME, "20 text/gemini\r\n=> sibling.gmi Sibling\n"),
            ("gemini://capsule.test/dir/sibling.gmi", "20 text/gemini\r\nhi\n"),
        ]);

        let missing = harness.navigator.open_link(1);
        assert!(matches!(missing, NavigationOutcome::Failed(_)));

        harness.navigator.open(HOME, OpenOptions::default());
        harness.navigator.open_link(7);
        assert_eq!(last_error(&harness), Some("Unknown link ID 7."));

        assert_eq!(
            harness.navigator.open_link(1),
            loaded("gemini://capsule.test/dir/sibling.gmi", 0)
        );
    }

    #[test]
    fn typed_digits_select_links() {
        let mut page = String::from("# Many links\n");
        for index in 1..=15 {
            page.push_str(&format!("=> /p{index}\n"));
        }
        let raw = format!("20 text/gemini\r\n{page}");
        let mut harness = harness(&[
            (HOME, raw.as_str()),
            ("gemini://capsule.test/p12", "20 text/gemini\r\ntwelve\n"),
            ("gemini://capsule.test/p3", "20 text/gemini\r\nthree\n"),
        ]);

        harness.navigator.open(HOME, OpenOptions::default());
        let outcome = harness
            .navigator
            .handle_digit(1, [KeyInput::Printable('x'), KeyInput::Digit(2)]);
        assert_eq!(outcome, loaded("gemini://capsule.test/p12", 0));

        harness.navigator.go_back();
        assert_eq!(
            harness.navigator.handle_digit(3, []),
            loaded("gemini://capsule.test/p3", 0)
        );

        harness.navigator.go_back();
        assert_eq!(
            harness.navigator.handle_digit(1, [KeyInput::Cancel]),
            NavigationOutcome::Dismissed
        );
    }

    #[test]
    fn binary_bodies_are_downloaded_without_navigating() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!("orbiter-navigation-test-{stamp}"));
        let storage =
            StorageManager::new(StorageConfig::default()).with_download_root(root.clone());
        let mut harness = harness_with_storage(
            &[
                (HOME, "20 text/gemini\r\nhome\n"),
                ("gemini://capsule.test/files/song.ogg", "20 audio/ogg\r\nOggS"),
            ],
            storage,
        );

        harness.navigator.open(HOME, OpenOptions::default());
        let outcome = harness.navigator.open("/files/song.ogg", OpenOptions::default());

        assert_eq!(
            outcome,
            NavigationOutcome::Downloaded {
                url: "gemini://capsule.test/files/song.ogg".to_owned(),
                path: root.join("song.ogg"),
            }
        );
        assert_eq!(harness.navigator.current_url(), Some(HOME));
        assert_eq!(fs::read(root.join("song.ogg")).ok(), Some(b"OggS".to_vec()));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn connection_errors_become_status_messages() {
        let mut harness = harness(&[]);
        let outcome = harness
            .navigator
            .open("gemini://nowhere.test/", OpenOptions::default());

        assert!(matches!(outcome, NavigationOutcome::Failed(_)));
        assert_eq!(
            last_error(&harness),
            Some("Connection failed (gemini://nowhere.test/).")
        );
    }

    #[test]
    fn unlisted_status_codes_are_not_rendered() {
        let mut harness = harness(&[("gemini://capsule.test/odd", "25 text/plain\r\nhi")]);
        let outcome = harness
            .navigator
            .open("gemini://capsule.test/odd", OpenOptions::absolute());

        assert!(matches!(outcome, NavigationOutcome::Failed(ref error) if error.is(ErrorKind::ParseError)));
        assert!(harness.navigator.frontend().loaded.is_empty());
        assert_eq!(harness.navigator.current_url(), None);
    }

    #[test]
    fn interrupt_during_fetch_reports_cancellation() {
        let mut registry = SchemeRegistry::new();
        registry.register("gemini", InterruptedCapsule);
        let mut navigator = Navigator::new(
            RecordingFrontend::default(),
            registry,
            StorageManager::new(StorageConfig::default()),
            TrustStore::new(),
            &BrowserOptions::default(),
        );

        let outcome = navigator.open(HOME, OpenOptions::absolute());
        match outcome {
            NavigationOutcome::Failed(error) => {
                assert!(error.is(ErrorKind::Cancelled));
                assert_eq!(error.message, "Request cancelled.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            navigator.frontend().errors.last().map(String::as_str),
            Some("Request cancelled.")
        );
        assert!(navigator.frontend().loaded.is_empty());
        assert_eq!(navigator.current_url(), None);
        assert!(navigator.cancel_token().is_cancelled());
    }
}
