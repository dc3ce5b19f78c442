//! Capability interface over a browser automation backend.
//!
//! The session, scroll loader and orchestrator only talk to [`Browser`], so
//! any engine that can open a page, enumerate elements, scroll and wait can
//! drive an extraction. [`ChromeBrowser`] is the production backend; tests use
//! the scripted backend in `fake`.

pub mod chrome;
#[cfg(test)]
pub mod fake;

use std::time::Duration;

pub use chrome::ChromeBrowser;

/// Something a page can be waited on for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition<'a> {
    /// At least one element matches the CSS selector.
    Present(&'a str),
    /// A button whose visible text contains the needle, ignoring case.
    ButtonText(&'a str),
}

/// A handle to one rendered catalog entry. Reading may fail if the node was
/// detached by the page after it was enumerated.
pub trait CatalogEntry {
    fn text(&self) -> Result<String, BrowserError>;

    /// `href` of the first anchor inside the entry, if any.
    fn link(&self) -> Result<Option<String>, BrowserError>;
}

pub trait Browser {
    fn open(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn CatalogEntry + '_>>, BrowserError>;

    fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        Ok(self.find_all(selector)?.len())
    }

    fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// Block until `condition` holds or `timeout` elapses. Returns whether
    /// the condition was met; running out of time is not an error.
    fn wait_for(&self, condition: &Condition<'_>, timeout: Duration) -> Result<bool, BrowserError>;

    fn click(&self, condition: &Condition<'_>) -> Result<(), BrowserError>;

    /// Terminate the underlying browser. Must be idempotent.
    fn close(&mut self);
}

/// Errors raised by a browser backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element: {0}")]
    StaleElement(String),

    #[error("JavaScript execution error: {0}")]
    JavaScript(String),

    #[error("Browser session is closed")]
    Closed,
}
