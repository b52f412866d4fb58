//! Line-oriented terminal front end and its command loop.

use ob_browser::Frontend;
use ob_browser::KeyInput;
use ob_browser::Navigator;
use ob_browser::OpenOptions;
use ob_gemtext::Document;
use std::io::BufRead;
use std::io::Write;
use tracing::debug;

pub const PAGE_WIDTH: usize = 80;

const HELP: &str = "\
Commands:
  o, open <url>  open a URL
  <digits>       follow a link; '-' erases a digit, 'x' cancels
  b              back
  r              reload
  u              parent directory
  U              root of the capsule
  h              history
  q              quit";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    /// First digit and the keys typed after it.
    Link(u8, Vec<KeyInput>),
    Back,
    Reload,
    Parent,
    Root,
    History,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let mut chars = line.chars();
    let Some(first) = chars.next() else {
        return Command::Empty;
    };

    if let Some(digit) = first.to_digit(10).and_then(|digit| u8::try_from(digit).ok()) {
        let keys = chars.map(link_key).collect();
        return Command::Link(digit, keys);
    }

    let (word, argument) = match line.split_once(char::is_whitespace) {
        Some((word, argument)) => (word, argument.trim()),
        None => (line, ""),
    };

    match (word, argument) {
        ("o" | "open", "") => Command::Unknown(word.to_owned()),
        ("o" | "open", url) => Command::Open(url.to_owned()),
        ("b", "") => Command::Back,
        ("r", "") => Command::Reload,
        ("u", "") => Command::Parent,
        ("U", "") => Command::Root,
        ("h", "") => Command::History,
        ("?" | "help", "") => Command::Help,
        ("q" | "quit", "") => Command::Quit,
        _ => Command::Unknown(line.to_owned()),
    }
}

fn link_key(ch: char) -> KeyInput {
    match ch {
        '-' => KeyInput::Erase,
        'x' | 'X' => KeyInput::Cancel,
        other => KeyInput::from_char(other),
    }
}

/// Prints pages and statuses to `output` and reads answers from `input`.
pub struct TerminalFrontend<R, W> {
    input: R,
    output: W,
    width: usize,
}

impl<R: BufRead, W: Write> TerminalFrontend<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            width: PAGE_WIDTH,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Reads one line without its terminator; `None` at end of input.
    pub fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_owned()),
            Err(error) => {
                debug!(%error, "input closed");
                None
            }
        }
    }

    fn show_prompt(&mut self, current: Option<&str>) {
        let text = match current {
            Some(url) => format!("{url}> "),
            None => "> ".to_owned(),
        };
        self.emit_inline(&text);
    }

    fn emit(&mut self, text: &str) {
        if let Err(error) = writeln!(self.output, "{text}") {
            debug!(%error, "terminal write failed");
        }
    }

    fn emit_inline(&mut self, text: &str) {
        if let Err(error) = write!(self.output, "{text}").and_then(|()| self.output.flush()) {
            debug!(%error, "terminal write failed");
        }
    }
}

impl<R: BufRead, W: Write> Frontend for TerminalFrontend<R, W> {
    fn load_page(&mut self, url: &str, page: &Document) {
        let heading = page.title.as_deref().unwrap_or(url);
        self.emit(&format!("== {heading}"));
        for line in page.render_lines(self.width) {
            self.emit(&line);
        }
    }

    fn set_status(&mut self, text: &str) {
        self.emit(&format!("-- {text}"));
    }

    fn set_status_error(&mut self, text: &str) {
        self.emit(&format!("!! {text}"));
    }

    fn prompt(&mut self, message: &str, sensitive: bool) -> Option<String> {
        // No echo control on a plain line reader.
        let marker = if sensitive { " (sensitive)" } else { "" };
        self.emit_inline(&format!("?? {message}{marker}: "));
        self.read_line().filter(|answer| !answer.is_empty())
    }
}

/// Runs commands until `q` or end of input.
pub fn run<R: BufRead, W: Write>(navigator: &mut Navigator<TerminalFrontend<R, W>>) {
    loop {
        let current = navigator.current_url().map(str::to_owned);
        navigator.frontend_mut().show_prompt(current.as_deref());
        let Some(line) = navigator.frontend_mut().read_line() else {
            break;
        };

        match parse_command(&line) {
            Command::Open(url) => {
                navigator.open(&url, OpenOptions::absolute());
            }
            Command::Link(first, keys) => {
                navigator.handle_digit(first, keys);
            }
            Command::Back => {
                if navigator.go_back().is_none() {
                    navigator.frontend_mut().set_status("No previous page.");
                }
            }
            Command::Reload => {
                if navigator.reload().is_none() {
                    navigator.frontend_mut().set_status("Nothing to reload.");
                }
            }
            Command::Parent => {
                if navigator.go_to_parent().is_none() {
                    navigator.frontend_mut().set_status("No page open.");
                }
            }
            Command::Root => {
                if navigator.go_to_root().is_none() {
                    navigator.frontend_mut().set_status("No page open.");
                }
            }
            Command::History => {
                navigator.open("about:history", OpenOptions::absolute());
            }
            Command::Help => navigator.frontend_mut().emit(HELP),
            Command::Quit => break,
            Command::Empty => {}
            Command::Unknown(text) => navigator
                .frontend_mut()
                .set_status_error(&format!("Unknown command {text}.")),
        }
    }
}
