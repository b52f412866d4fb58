//! Link selection by typed digits.
//!
//! A single digit is enough on short pages. On longer ones, digits are
//! collected until exactly one link id starts with them, the longest
//! possible id length is reached, or the user submits or cancels.

use ob_core::LinkTable;

/// Key events fed to a running capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Digit(u8),
    /// Any other printable character; ignored.
    Printable(char),
    Erase,
    Cancel,
    Submit,
}

impl KeyInput {
    pub fn from_char(ch: char) -> Self {
        match ch.to_digit(10).and_then(|digit| u8::try_from(digit).ok()) {
            Some(digit) => Self::Digit(digit),
            None => Self::Printable(ch),
        }
    }
}

/// Result of one capture step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStep {
    Continue,
    Cancelled,
    Resolved(u32),
    Invalid(String),
}

/// Number of decimal digits in `link_count`.
pub fn max_digits_for(link_count: usize) -> usize {
    let mut count = link_count;
    let mut digits = 0;
    while count > 0 {
        digits += 1;
        count /= 10;
    }
    digits
}

/// Link ids that `digits` may still designate.
///
/// Once `max_digits` digits are typed the input is taken literally.
pub fn disambiguate(digits: &str, max_digits: usize, links: &LinkTable) -> Vec<u32> {
    if digits.len() == max_digits {
        return digits.parse::<u32>().ok().into_iter().collect();
    }

    links
        .ids()
        .filter(|id| id.to_string().starts_with(digits))
        .collect()
}

/// Digit capture in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCapture {
    digits: String,
    max_digits: usize,
}

impl LinkCapture {
    /// Starts a capture from the first digit typed.
    pub fn begin(first_digit: u8, links: &LinkTable) -> (Self, CaptureStep) {
        let digits = first_digit.to_string();
        let max_digits = max_digits_for(links.len());
        let capture = Self {
            digits,
            max_digits,
        };

        if links.len() < 10 {
            return (capture, CaptureStep::Resolved(u32::from(first_digit)));
        }

        let step = capture.check(links);
        (capture, step)
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn max_digits(&self) -> usize {
        self.max_digits
    }

    pub fn feed(&mut self, key: KeyInput, links: &LinkTable) -> CaptureStep {
        match key {
            KeyInput::Digit(digit) => {
                self.digits.push(char::from(b'0' + digit % 10));
                self.check(links)
            }
            KeyInput::Printable(_) => CaptureStep::Continue,
            KeyInput::Erase => {
                self.digits.pop();
                if self.digits.is_empty() {
                    CaptureStep::Cancelled
                } else {
                    CaptureStep::Continue
                }
            }
            KeyInput::Cancel => CaptureStep::Cancelled,
            KeyInput::Submit => self.submit(),
        }
    }

    fn check(&self, links: &LinkTable) -> CaptureStep {
        match disambiguate(&self.digits, self.max_digits, links).as_slice() {
            [only] => CaptureStep::Resolved(*only),
            _ => CaptureStep::Continue,
        }
    }

    fn submit(&self) -> CaptureStep {
        if self.digits.is_empty() {
            return CaptureStep::Cancelled;
        }
        match self.digits.parse::<u32>() {
            Ok(id) => CaptureStep::Resolved(id),
            Err(_) => CaptureStep::Invalid(format!("Invalid link ID {}.", self.digits)),
        }
    }
}
