//! Shared primitives used across Orbiter crates.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Result alias used across the workspace.
pub type OrbiterResult<T> = Result<T, OrbiterError>;

/// Failure categories surfaced to the user as a single status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    ConnectionFailed,
    ErrorCert,
    UntrustedCert,
    InvalidCert,
    NoResponse,
    ParseError,
    TooManyRedirects,
    UnknownEncoding,
    DownloadIo,
    ServerError,
    UnhandledStatus,
    UnsupportedScheme,
    UnknownLink,
    Cancelled,
    Storage,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid-url",
            Self::ConnectionFailed => "connection-failed",
            Self::ErrorCert => "error-cert",
            Self::UntrustedCert => "untrusted-cert",
            Self::InvalidCert => "invalid-cert",
            Self::NoResponse => "no-response",
            Self::ParseError => "parse-error",
            Self::TooManyRedirects => "too-many-redirects",
            Self::UnknownEncoding => "unknown-encoding",
            Self::DownloadIo => "download-io",
            Self::ServerError => "server-error",
            Self::UnhandledStatus => "unhandled-status",
            Self::UnsupportedScheme => "unsupported-scheme",
            Self::UnknownLink => "unknown-link",
            Self::Cancelled => "cancelled",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

/// Top-level error type carrying a kind, a dotted code and a readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrbiterError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

impl OrbiterError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, code, message)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for OrbiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for OrbiterError {}

/// Cooperative cancellation flag shared between the signal listener and the
/// request in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn check(&self) -> OrbiterResult<()> {
        if self.is_cancelled() {
            return Err(OrbiterError::new(
                ErrorKind::Cancelled,
                "core.cancelled",
                "Request cancelled.",
            ));
        }

        Ok(())
    }
}

/// Navigable targets of a page keyed by their 1-based link id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    links: BTreeMap<u32, String>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a link under the next free id and returns that id.
    pub fn push(&mut self, url: impl Into<String>) -> u32 {
        let id = self.links.keys().next_back().map_or(1, |last| last + 1);
        self.links.insert(id, url.into());
        id
    }

    pub fn insert(&mut self, id: u32, url: impl Into<String>) -> Option<String> {
        self.links.insert(id, url.into())
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.links.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.links.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.links.iter().map(|(id, url)| (*id, url.as_str()))
    }
}

impl FromIterator<(u32, String)> for LinkTable {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}
