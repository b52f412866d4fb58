//! Callbacks the navigator drives on the user interface.

use ob_gemtext::Document;

/// User interface seen by the navigator.
pub trait Frontend {
    /// Called once per successfully rendered navigation.
    fn load_page(&mut self, url: &str, page: &Document);

    fn set_status(&mut self, text: &str);

    fn set_status_error(&mut self, text: &str);

    /// Asks for one line of text; `None` means the user dismissed the prompt.
    fn prompt(&mut self, message: &str, sensitive: bool) -> Option<String>;
}
