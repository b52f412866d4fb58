//! Rendered pages keyed by normalized URL.

use ob_gemtext::Document;
use std::collections::HashMap;

/// Page cache without eviction; it lives as long as the navigator.
#[derive(Debug, Clone, Default)]
pub struct PageCache {
    pages: HashMap<String, Document>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&Document> {
        self.pages.get(url)
    }

    pub fn insert(&mut self, url: impl Into<String>, page: Document) {
        self.pages.insert(url.into(), page);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
