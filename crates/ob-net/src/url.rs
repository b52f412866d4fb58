//! URL algebra: parsing, relative resolution and derivations.
//!
//! Every function here is total. Malformed input degrades to a best-effort
//! split rather than an error; only [`ParsedUrl::host_and_port`] validates.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use url::Host;

/// Scheme assumed for network locations typed without one.
pub const DEFAULT_SCHEME: &str = "gemini";

/// Port used when a `gemini` URL does not name one.
pub const DEFAULT_PORT: u16 = 1965;

/// Bytes left verbatim when user text becomes a query component.
const QUERY_TEXT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Components of a URL-like string.
///
/// `None` and empty differ: `gemini://host?` has an empty query while
/// `gemini://host` has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: Option<String>,
    pub netloc: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl ParsedUrl {
    pub fn with_default_scheme(mut self, scheme: &str) -> Self {
        if self.scheme.is_none() {
            self.scheme = Some(scheme.to_owned());
        }
        self
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Host part of the network location, without userinfo, port or brackets.
    pub fn host(&self) -> Option<&str> {
        let (host, _) = split_netloc(self.netloc.as_deref()?);
        if host.is_empty() { None } else { Some(host) }
    }

    /// Explicit port text, if the network location carries one.
    pub fn port_text(&self) -> Option<&str> {
        split_netloc(self.netloc.as_deref()?).1
    }

    /// Validated host and port, `default_port` filling an absent port.
    pub fn host_and_port(&self, default_port: u16) -> OrbiterResult<(String, u16)> {
        let raw = self.host().ok_or_else(|| {
            OrbiterError::new(
                ErrorKind::InvalidUrl,
                "net.url.host_missing",
                format!("URL `{}` has no host", unparse_url(self)),
            )
        })?;

        let host = parse_host(raw)?;
        let port = match self.port_text() {
            None | Some("") => default_port,
            Some(text) => text.parse::<u16>().map_err(|error| {
                OrbiterError::new(
                    ErrorKind::InvalidUrl,
                    "net.url.port_invalid",
                    format!("invalid port `{text}`: {error}"),
                )
            })?,
        };

        Ok((host, port))
    }

    /// Path with percent escapes decoded, for local file access.
    pub fn decoded_path(&self) -> String {
        percent_decode_str(&self.path)
            .decode_utf8_lossy()
            .into_owned()
    }
}

/// Splits `input` into its components.
///
/// With `absolute`, a string lacking a `//` network location is read as if
/// it started with `//`, so `example.org/page` names the host `example.org`.
/// A leading `name:` is still kept as a scheme when it cannot be a host
/// followed by a port (`about:history` stays as is, `localhost:1965/` does
/// not).
pub fn parse_url(input: &str, absolute: bool) -> ParsedUrl {
    let input = input.trim();
    let parsed = split_components(input);

    if !absolute || parsed.netloc.is_some() {
        return parsed;
    }

    let looks_like_host = match (&parsed.scheme, input.split_once(':')) {
        (None, _) => true,
        (Some(scheme), Some((_, rest))) => {
            scheme.contains('.') || rest.starts_with(|ch: char| ch.is_ascii_digit())
        }
        (Some(_), None) => false,
    };

    if looks_like_host {
        split_components(&format!("//{input}"))
    } else {
        parsed
    }
}

/// Reassembles components into a URL string.
pub fn unparse_url(parts: &ParsedUrl) -> String {
    let mut out = String::new();
    if let Some(scheme) = &parts.scheme {
        out.push_str(scheme);
        out.push(':');
    }
    if let Some(netloc) = &parts.netloc {
        out.push_str("//");
        out.push_str(netloc);
    }
    out.push_str(&parts.path);
    if let Some(query) = &parts.query {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = &parts.fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Parses then reassembles `input`, giving network locations the default scheme.
pub fn sanitize_url(input: &str, absolute: bool) -> String {
    let mut parts = parse_url(input, absolute);
    if parts.netloc.is_some() {
        parts = parts.with_default_scheme(DEFAULT_SCHEME);
    }
    unparse_url(&parts)
}

/// Resolves `reference` against `base` with the standard merge algorithm.
pub fn join_url(base: &str, reference: &str) -> String {
    let base = parse_url(base, false);
    let reference = parse_url(reference, false);

    let target = if reference.scheme.is_some() {
        ParsedUrl {
            path: remove_dot_segments(&reference.path),
            ..reference
        }
    } else if reference.netloc.is_some() {
        ParsedUrl {
            scheme: base.scheme,
            path: remove_dot_segments(&reference.path),
            ..reference
        }
    } else if reference.path.is_empty() {
        ParsedUrl {
            scheme: base.scheme,
            netloc: base.netloc,
            path: base.path,
            query: reference.query.or(base.query),
            fragment: reference.fragment,
        }
    } else {
        let path = if reference.path.starts_with('/') {
            remove_dot_segments(&reference.path)
        } else {
            remove_dot_segments(&merge_paths(&base, &reference.path))
        };
        ParsedUrl {
            scheme: base.scheme,
            netloc: base.netloc,
            path,
            query: reference.query,
            fragment: reference.fragment,
        }
    };

    unparse_url(&target)
}

/// Collapses `.` and `..` segments left to right; never climbs above the root.
pub fn remove_dot_segments(path: &str) -> String {
    let mut input = path.to_owned();
    let mut output = String::new();

    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest.to_owned();
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest.to_owned();
        } else if let Some(rest) = input.strip_prefix("/./") {
            input = format!("/{rest}");
        } else if input == "/." {
            input = "/".to_owned();
        } else if let Some(rest) = input.strip_prefix("/../") {
            input = format!("/{rest}");
            output = remove_last_segment(&output).to_owned();
        } else if input == "/.." {
            input = "/".to_owned();
            output = remove_last_segment(&output).to_owned();
        } else if input == "." || input == ".." {
            input.clear();
        } else {
            let (first, rest) = pop_first_segment(&input);
            output.push_str(first);
            input = rest.to_owned();
        }
    }

    output
}

/// Drops the last `/`-separated segment along with its leading slash.
pub fn remove_last_segment(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Splits off the first segment, including a leading slash if present.
pub fn pop_first_segment(path: &str) -> (&str, &str) {
    if path.is_empty() {
        return ("", "");
    }

    let start = usize::from(path.starts_with('/'));
    match path[start..].find('/') {
        Some(offset) => path.split_at(start + offset),
        None => (path, ""),
    }
}

/// URL one directory up, keeping the trailing slash; query is dropped.
pub fn get_parent_url(url: &str) -> String {
    let mut parts = parse_url(url, false);
    if parts.path.is_empty() || parts.path == "/" {
        return unparse_url(&parts);
    }

    let trimmed = parts.path.strip_suffix('/').unwrap_or(&parts.path);
    let Some(index) = trimmed.rfind('/') else {
        return unparse_url(&parts);
    };

    parts.path = trimmed[..=index].to_owned();
    parts.query = None;
    parts.fragment = None;
    unparse_url(&parts)
}

/// Same scheme and network location with the path replaced by `/`.
pub fn get_root_url(url: &str) -> String {
    let mut parts = parse_url(url, false);
    parts.path = "/".to_owned();
    parts.query = None;
    parts.fragment = None;
    unparse_url(&parts)
}

/// Attaches percent-encoded `text` as the query, replacing any previous one.
pub fn set_parameter(url: &str, text: &str) -> String {
    let mut parts = parse_url(url, false);
    parts.query = Some(utf8_percent_encode(text, QUERY_TEXT).to_string());
    parts.fragment = None;
    unparse_url(&parts)
}

fn merge_paths(base: &ParsedUrl, reference_path: &str) -> String {
    if base.netloc.is_some() && base.path.is_empty() {
        return format!("/{reference_path}");
    }

    match base.path.rfind('/') {
        Some(index) => format!("{}{reference_path}", &base.path[..=index]),
        None => reference_path.to_owned(),
    }
}

fn split_components(input: &str) -> ParsedUrl {
    let mut rest = input;

    let fragment = match rest.split_once('#') {
        Some((head, fragment)) => {
            rest = head;
            Some(fragment.to_owned())
        }
        None => None,
    };

    let query = match rest.split_once('?') {
        Some((head, query)) => {
            rest = head;
            Some(query.to_owned())
        }
        None => None,
    };

    let mut scheme = None;
    if let Some(index) = rest.find([':', '/']) {
        let candidate = &rest[..index];
        if rest[index..].starts_with(':') && is_scheme(candidate) {
            scheme = Some(candidate.to_ascii_lowercase());
            rest = &rest[index + 1..];
        }
    }

    let mut netloc = None;
    if let Some(after) = rest.strip_prefix("//") {
        let end = after.find('/').unwrap_or(after.len());
        netloc = Some(after[..end].to_owned());
        rest = &after[end..];
    }

    ParsedUrl {
        scheme,
        netloc,
        path: rest.to_owned(),
        query,
        fragment,
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// Splits `userinfo@host:port` into host and optional port text.
fn split_netloc(netloc: &str) -> (&str, Option<&str>) {
    let hostport = match netloc.rfind('@') {
        Some(index) => &netloc[index + 1..],
        None => netloc,
    };

    if let Some(bracketed) = hostport.strip_prefix('[') {
        return match bracketed.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (bracketed, None),
        };
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (hostport, None),
    }
}

fn parse_host(raw: &str) -> OrbiterResult<String> {
    let candidate = if raw.contains(':') {
        format!("[{raw}]")
    } else {
        raw.to_owned()
    };

    let host = Host::parse(&candidate).map_err(|error| {
        OrbiterError::new(
            ErrorKind::InvalidUrl,
            "net.url.host_invalid",
            format!("invalid host `{raw}`: {error}"),
        )
    })?;

    Ok(match host {
        Host::Domain(domain) => domain,
        Host::Ipv4(address) => address.to_string(),
        Host::Ipv6(address) => address.to_string(),
    })
}
