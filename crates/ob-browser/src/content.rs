//! Interpretation of success response bodies.

use encoding_rs::Encoding;
use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use ob_gemtext::Document;
use ob_net::MimeType;
use ob_net::Response;
use ob_storage::StorageManager;
use std::path::PathBuf;
use tracing::debug;

/// What a success body turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Page(Document),
    Downloaded(PathBuf),
}

/// Renders text bodies and saves everything else under the download directory.
pub fn interpret(
    response: &Response,
    url_path: &str,
    storage: &StorageManager,
) -> OrbiterResult<Content> {
    let mime = response.mime_type().ok_or_else(|| {
        OrbiterError::new(
            ErrorKind::ParseError,
            "browser.content.mime_invalid",
            format!("Invalid MIME type {}.", response.meta),
        )
    })?;
    debug!(mime = mime.essence().as_str(), bytes = response.body.len(), "interpreting body");

    if !mime.is_text() {
        return storage
            .save_download(url_path, &response.body)
            .map(Content::Downloaded);
    }

    let text = decode_text(&response.body, &mime)?;
    let page = if mime.is_gemtext() {
        Document::parse_gemtext(&text)
    } else {
        Document::from_plain_text(&text)
    };
    Ok(Content::Page(page))
}

/// Decodes with the declared charset; malformed sequences become U+FFFD.
pub fn decode_text(body: &[u8], mime: &MimeType) -> OrbiterResult<String> {
    let charset = mime.charset();
    let encoding = Encoding::for_label(charset.as_bytes()).ok_or_else(|| {
        OrbiterError::new(
            ErrorKind::UnknownEncoding,
            "browser.content.encoding_unknown",
            format!("Unknown encoding {charset}."),
        )
    })?;

    let (text, _, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(charset, "body contained malformed sequences");
    }
    Ok(text.into_owned())
}
