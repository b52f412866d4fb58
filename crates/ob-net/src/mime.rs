//! MIME types announced in success response metas.

use std::collections::BTreeMap;

/// `main/sub; key=value` media type with lowercase type names and keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    pub main_type: String,
    pub sub_type: String,
    pub parameters: BTreeMap<String, String>,
}

impl MimeType {
    /// `text/gemini; charset=utf-8`, assumed when a success meta is empty.
    pub fn gemtext() -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("charset".to_owned(), "utf-8".to_owned());
        Self {
            main_type: "text".to_owned(),
            sub_type: "gemini".to_owned(),
            parameters,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut pieces = text.split(';');
        let essence = pieces.next()?.trim();
        let (main_type, sub_type) = essence.split_once('/')?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();
        if main_type.is_empty() || sub_type.is_empty() {
            return None;
        }

        let mut parameters = BTreeMap::new();
        for piece in pieces {
            let Some((key, value)) = piece.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"');
            parameters.insert(key, value.to_owned());
        }

        Some(Self {
            main_type: main_type.to_ascii_lowercase(),
            sub_type: sub_type.to_ascii_lowercase(),
            parameters,
        })
    }

    /// `main/sub` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Declared charset, `utf-8` when absent.
    pub fn charset(&self) -> &str {
        self.parameters
            .get("charset")
            .map_or("utf-8", String::as_str)
    }

    pub fn is_text(&self) -> bool {
        self.main_type == "text"
    }

    pub fn is_gemtext(&self) -> bool {
        self.is_text() && self.sub_type == "gemini"
    }
}
