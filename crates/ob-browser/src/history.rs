//! Browsing history: a back-list stack and a de-duplicated visit list.

/// Bounded browsing history.
///
/// Both lists drop their oldest entry once `limit` is exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    urls: Vec<String>,
    backlist: Vec<String>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            urls: Vec::new(),
            backlist: Vec::new(),
            limit,
        }
    }

    /// Records `url`; an already visited URL moves to the most recent slot.
    pub fn push(&mut self, url: &str) {
        self.urls.retain(|known| known != url);
        self.urls.push(url.to_owned());
        trim_front(&mut self.urls, self.limit);

        self.backlist.push(url.to_owned());
        trim_front(&mut self.backlist, self.limit);
    }

    /// Takes the most recent back-list entry.
    pub fn pop(&mut self) -> Option<String> {
        self.backlist.pop()
    }

    pub fn len(&self) -> usize {
        self.backlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlist.is_empty()
    }

    /// Visited URLs, most recent first, without duplicates.
    pub fn recent(&self) -> impl Iterator<Item = &str> + '_ {
        self.urls.iter().rev().map(String::as_str)
    }

    /// Gemtext page listing [`History::recent`] as links.
    pub fn to_gemtext(&self) -> String {
        let links: Vec<String> = self.recent().map(|url| format!("=> {url}")).collect();
        format!("# History\n\n{}", links.join("\n"))
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn trim_front(list: &mut Vec<String>, limit: usize) {
    if list.len() > limit {
        let excess = list.len() - limit;
        list.drain(..excess);
    }
}
