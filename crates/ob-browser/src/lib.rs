//! Browsing session: navigation, history, cache and link selection.

pub mod cache;
pub mod content;
pub mod frontend;
pub mod history;
pub mod links;
pub mod navigation;
pub mod schemes;

pub use frontend::Frontend;
pub use history::History;
pub use links::CaptureStep;
pub use links::KeyInput;
pub use links::LinkCapture;
pub use navigation::BrowserOptions;
pub use navigation::MAX_REDIRECTS;
pub use navigation::NavigationOutcome;
pub use navigation::Navigator;
pub use navigation::OpenOptions;
pub use schemes::SchemeHandler;
pub use schemes::SchemeRegistry;
