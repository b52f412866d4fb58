//! Gemtext parsing into typed line elements and a link table.

use ob_core::LinkTable;

const PREFORMATTED_FENCE: &str = "```";
const LIST_ITEM_MARK: &str = "• ";
const SPLIT_MARK: char = '-';

/// One logical gemtext line, or a preformatted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Paragraph(String),
    Title { level: u8, text: String },
    Link { id: u32, url: String, text: String },
    Preformatted { alt: String, lines: Vec<String> },
    Blockquote(String),
    ListItem(String),
}

impl Element {
    fn has_margins(&self) -> bool {
        !matches!(self, Self::Link { .. } | Self::ListItem(_))
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A parsed page: its elements, the links they reference and a title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub elements: Vec<Element>,
    pub links: LinkTable,
    pub title: Option<String>,
}

impl Document {
    /// Parses gemtext; link ids are assigned from 1 in document order.
    pub fn parse_gemtext(text: &str) -> Self {
        let mut document = Self::default();
        let mut preformatted: Option<(String, Vec<String>)> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim_end();

            if let Some(rest) = line.strip_prefix(PREFORMATTED_FENCE) {
                match preformatted.take() {
                    Some((alt, lines)) => {
                        document.elements.push(Element::Preformatted { alt, lines });
                    }
                    None => preformatted = Some((rest.trim().to_owned(), Vec::new())),
                }
                continue;
            }

            if let Some((_, lines)) = preformatted.as_mut() {
                lines.push(line.to_owned());
                continue;
            }

            if line.is_empty() {
                continue;
            }

            let element = document.parse_line(line);
            document.elements.push(element);
        }

        // An unterminated block runs to the end of the document.
        if let Some((alt, lines)) = preformatted {
            document.elements.push(Element::Preformatted { alt, lines });
        }

        document.title = document.elements.iter().find_map(|element| match element {
            Element::Title { text, .. } => Some(text.clone()),
            _ => None,
        });
        document
    }

    /// Wraps non-gemtext text verbatim in a single preformatted block.
    pub fn from_plain_text(text: &str) -> Self {
        let lines = text.lines().map(str::to_owned).collect();
        Self {
            elements: vec![Element::Preformatted {
                alt: String::new(),
                lines,
            }],
            links: LinkTable::new(),
            title: None,
        }
    }

    fn parse_line(&mut self, line: &str) -> Element {
        if let Some((level, text)) = parse_title(line) {
            return Element::Title {
                level,
                text: text.to_owned(),
            };
        }

        if let Some((url, text)) = parse_link(line) {
            let id = self.links.push(url);
            return Element::Link {
                id,
                url: url.to_owned(),
                text: text.to_owned(),
            };
        }

        if let Some(text) = line.strip_prefix('>') {
            return Element::Blockquote(text.trim_start().to_owned());
        }

        if let Some(text) = parse_list_item(line) {
            return Element::ListItem(text.to_owned());
        }

        Element::Paragraph(line.to_owned())
    }

    /// Lays the document out as terminal lines no wider than `width` columns.
    ///
    /// Preformatted lines are never wrapped.
    pub fn render_lines(&self, width: usize) -> Vec<String> {
        let width = width.max(8);
        let mut rendered = Vec::new();
        let mut previous: Option<&Element> = None;

        for element in &self.elements {
            if let Some(previous) = previous {
                let separate = element.has_margins()
                    || previous.has_margins()
                    || !element.same_kind(previous);
                if separate {
                    rendered.push(String::new());
                }
            }
            rendered.extend(render_element(element, width));
            previous = Some(element);
        }

        rendered
    }
}

/// Convenience wrapper over [`Document::parse_gemtext`].
pub fn parse_gemtext(text: &str) -> Document {
    Document::parse_gemtext(text)
}

fn parse_title(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|byte| *byte == b'#').count();
    if hashes == 0 || hashes > 3 {
        return None;
    }

    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let text = rest.trim_start();
    if text.is_empty() {
        return None;
    }

    let level = u8::try_from(hashes).ok()?;
    Some((level, text))
}

fn parse_link(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("=>")?.trim_start();
    if rest.is_empty() {
        return None;
    }

    match rest.split_once(char::is_whitespace) {
        Some((url, text)) => Some((url, text.trim_start())),
        None => Some((rest, "")),
    }
}

fn parse_list_item(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('*')?;
    let mut chars = rest.chars();
    let separator = chars.next()?;
    if !separator.is_whitespace() {
        return None;
    }
    Some(chars.as_str())
}

fn render_element(element: &Element, width: usize) -> Vec<String> {
    match element {
        Element::Title { level: 1, text } => wrap_words(text, width, 0)
            .into_iter()
            .map(|line| center(&line, width))
            .collect(),
        Element::Title { level: 2, text } => wrap_words(text, width, 2),
        Element::Title { text, .. } => wrap_words(text, width, 0),
        Element::Paragraph(text) => wrap_words(text, width, 0),
        Element::Link { id, url, text } => {
            let anchor = format!("[{id}] ");
            let label = if text.is_empty() { url } else { text };
            let mut lines = wrap_words(label, width, anchor.chars().count());
            if let Some(first) = lines.first_mut() {
                let body: String = first.chars().skip(anchor.chars().count()).collect();
                *first = format!("{anchor}{body}");
            }
            lines
        }
        Element::Preformatted { lines, .. } => lines.clone(),
        Element::Blockquote(text) => wrap_words(text, width, 2),
        Element::ListItem(text) => {
            let indent = LIST_ITEM_MARK.chars().count();
            let mut lines = wrap_words(text, width, indent);
            if let Some(first) = lines.first_mut() {
                let body: String = first.chars().skip(indent).collect();
                *first = format!("{LIST_ITEM_MARK}{body}");
            }
            lines
        }
    }
}

fn center(line: &str, width: usize) -> String {
    let length = line.chars().count();
    if length >= width {
        return line.to_owned();
    }
    let padding = (width - length) / 2;
    format!("{}{line}", " ".repeat(padding))
}

/// Greedy word wrap; words longer than a line are split with a hyphen.
fn wrap_words(text: &str, width: usize, indent: usize) -> Vec<String> {
    let margin = " ".repeat(indent);
    let room = width.saturating_sub(indent).max(2);
    let mut lines = Vec::new();
    let mut line = margin.clone();
    let mut line_len = 0_usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        let needed = if line_len == 0 { word.len() } else { word.len() + 1 };
        if line_len > 0 && line_len + needed > room {
            lines.push(std::mem::replace(&mut line, margin.clone()));
            line_len = 0;
        }

        while word.len() > room {
            let head: String = word[..room - 1].iter().collect();
            lines.push(format!("{margin}{head}{SPLIT_MARK}"));
            word.drain(..room - 1);
        }

        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.extend(word.iter());
        line_len += word.len();
    }

    if line_len > 0 || lines.is_empty() {
        lines.push(line);
    }
    lines
}
