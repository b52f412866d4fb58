//! Wire format: request framing, status codes and response headers.

use crate::mime::MimeType;
use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;

pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Request lines reaching this size, terminator included, are refused.
pub const MAX_REQUEST_BYTES: usize = 1024;

/// Upper bound for the meta string of a response header.
pub const MAX_META_BYTES: usize = 1024;

/// Bytes buffered while looking for the header terminator before giving up.
pub const MAX_HEADER_BYTES: usize = 1100;

/// Two-digit response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u8);

impl StatusCode {
    pub const INPUT: Self = Self(10);
    pub const SENSITIVE_INPUT: Self = Self(11);
    pub const SUCCESS: Self = Self(20);
    pub const REDIRECT: Self = Self(30);
    pub const PERMANENT_REDIRECT: Self = Self(31);
    pub const TEMPORARY_FAILURE: Self = Self(40);
    pub const SERVER_UNAVAILABLE: Self = Self(41);
    pub const CGI_ERROR: Self = Self(42);
    pub const PROXY_ERROR: Self = Self(43);
    pub const SLOW_DOWN: Self = Self(44);
    pub const PERMANENT_FAILURE: Self = Self(50);
    pub const NOT_FOUND: Self = Self(51);
    pub const GONE: Self = Self(52);
    pub const PROXY_REQUEST_REFUSED: Self = Self(53);
    pub const BAD_REQUEST: Self = Self(59);
    pub const CLIENT_CERTIFICATE_REQUIRED: Self = Self(60);
    pub const CERTIFICATE_NOT_AUTHORISED: Self = Self(61);
    pub const CERTIFICATE_NOT_VALID: Self = Self(62);

    /// Accepts only the codes listed in the protocol.
    pub fn new(value: u8) -> OrbiterResult<Self> {
        let status = Self(value);
        if status.name().is_none() {
            return Err(OrbiterError::new(
                ErrorKind::ParseError,
                "net.protocol.status_unknown",
                format!("unknown status code `{value}`"),
            ));
        }

        Ok(status)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Tens class of the code, e.g. 51 gives 50.
    pub fn generic(self) -> Self {
        Self(self.0 - self.0 % 10)
    }

    pub fn class(self) -> StatusClass {
        match self.generic().0 {
            10 => StatusClass::Input,
            20 => StatusClass::Success,
            30 => StatusClass::Redirect,
            40 => StatusClass::TemporaryFailure,
            50 => StatusClass::PermanentFailure,
            _ => StatusClass::ClientCertificate,
        }
    }

    pub fn is_success(self) -> bool {
        self.class() == StatusClass::Success
    }

    /// Name of a listed code, `None` otherwise.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            10 => "input",
            11 => "sensitive input",
            20 => "success",
            30 => "redirect",
            31 => "permanent redirect",
            40 => "temporary failure",
            41 => "server unavailable",
            42 => "CGI error",
            43 => "proxy error",
            44 => "slow down",
            50 => "permanent failure",
            51 => "not found",
            52 => "gone",
            53 => "proxy request refused",
            59 => "bad request",
            60 => "client certificate required",
            61 => "certificate not authorised",
            62 => "certificate not valid",
            _ => return None,
        };
        Some(name)
    }
}

/// Generic status classes used for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Input,
    Success,
    Redirect,
    TemporaryFailure,
    PermanentFailure,
    ClientCertificate,
}

/// Parsed response; `body` is empty unless the status is a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub meta: String,
    pub body: Vec<u8>,
}

impl Response {
    /// Parses a complete response buffer.
    pub fn parse(data: &[u8]) -> OrbiterResult<Self> {
        let header_end = find_line_end(data).ok_or_else(|| {
            parse_error(
                "net.protocol.header_unterminated",
                "response header has no line terminator",
            )
        })?;

        let header = std::str::from_utf8(&data[..header_end]).map_err(|error| {
            parse_error(
                "net.protocol.header_invalid_utf8",
                format!("response header is not valid UTF-8: {error}"),
            )
        })?;

        let (status, meta) = parse_header(header)?;
        let body = if status.is_success() {
            data[header_end + LINE_TERMINATOR.len()..].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            status,
            meta: meta.to_owned(),
            body,
        })
    }

    /// MIME type of a success response; an empty meta means gemtext.
    pub fn mime_type(&self) -> Option<MimeType> {
        if self.meta.trim().is_empty() {
            return Some(MimeType::gemtext());
        }
        MimeType::parse(&self.meta)
    }
}

/// Frames `url` as a request line, rejecting lines of `max_bytes` or more.
pub fn build_request(url: &str, max_bytes: usize) -> OrbiterResult<Vec<u8>> {
    if url.contains(['\r', '\n']) {
        return Err(OrbiterError::new(
            ErrorKind::InvalidUrl,
            "net.protocol.request_line_break",
            "request URL must not contain line breaks",
        ));
    }

    let mut payload = Vec::with_capacity(url.len() + LINE_TERMINATOR.len());
    payload.extend_from_slice(url.as_bytes());
    payload.extend_from_slice(LINE_TERMINATOR);

    if payload.len() >= max_bytes {
        return Err(OrbiterError::new(
            ErrorKind::InvalidUrl,
            "net.protocol.request_too_long",
            format!(
                "request is {} bytes, it must stay under {max_bytes}",
                payload.len()
            ),
        ));
    }

    Ok(payload)
}

/// Offset of the first CRLF in `buffer`.
pub fn find_line_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}

fn parse_header(header: &str) -> OrbiterResult<(StatusCode, &str)> {
    let bytes = header.as_bytes();
    let well_formed = bytes.len() >= 3
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b' ';
    if !well_formed {
        return Err(parse_error(
            "net.protocol.header_malformed",
            format!("malformed response header `{}`", truncate(header, 64)),
        ));
    }

    let value = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    let status = StatusCode::new(value)?;
    let meta = &header[3..];

    if meta.len() > MAX_META_BYTES {
        return Err(parse_error(
            "net.protocol.meta_too_long",
            format!(
                "response meta is {} bytes, the limit is {MAX_META_BYTES}",
                meta.len()
            ),
        ));
    }

    Ok((status, meta))
}

fn parse_error(code: &'static str, message: impl Into<String>) -> OrbiterError {
    OrbiterError::new(ErrorKind::ParseError, code, message)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
