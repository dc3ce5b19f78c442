use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserError, Condition};
use crate::config::{AgeGateSettings, BrowserSettings, Settings};
use crate::error::NavigationError;

/// Owns one browser for the length of a run. Dropping the session closes
/// the browser, so every exit path (error, cancellation, panic) releases it.
pub struct Session<B: Browser> {
    browser: B,
    nav: BrowserSettings,
    gate: AgeGateSettings,
    closed: bool,
}

impl<B: Browser> Session<B> {
    pub fn new(browser: B, settings: &Settings) -> Self {
        Self {
            browser,
            nav: settings.browser.clone(),
            gate: settings.age_gate.clone(),
            closed: false,
        }
    }

    /// Navigate to `url`, retrying with exponential backoff before giving up.
    pub fn open(&mut self, url: &str) -> Result<(), NavigationError> {
        let max_attempts = self.nav.navigation_retries + 1;
        let timeout = self.nav.navigation_timeout();
        let mut attempts = 0;
        let mut reason = String::new();

        while attempts < max_attempts {
            attempts += 1;
            match self.browser.open(url, timeout) {
                Ok(()) => {
                    debug!(url, attempts, "Page loaded");
                    return Ok(());
                }
                Err(BrowserError::Closed) => {
                    reason = BrowserError::Closed.to_string();
                    break;
                }
                Err(e) => {
                    reason = e.to_string();
                    if attempts < max_attempts {
                        let backoff = self.nav.retry_backoff(attempts - 1);
                        warn!(
                            "Navigation to {} failed (attempt {}/{}), backing off {:.1}s: {}",
                            url,
                            attempts,
                            max_attempts,
                            backoff.as_secs_f64(),
                            reason
                        );
                        std::thread::sleep(backoff);
                    }
                }
            }
        }

        Err(NavigationError {
            url: url.to_string(),
            attempts,
            reason,
        })
    }

    /// Click through an age-verification interstitial if one shows up within
    /// the wait window. A missing popup is the normal case and returns false.
    pub fn dismiss_age_gate(&self) -> Result<bool, BrowserError> {
        let affirmative = Condition::ButtonText(self.gate.affirmative_text.as_str());
        let wait = Duration::from_secs(self.gate.wait_secs);

        if !self.browser.wait_for(&affirmative, wait)? {
            info!("No age verification popup found");
            return Ok(false);
        }

        match self.browser.click(&affirmative) {
            Ok(()) => {
                info!("Age verification completed");
                std::thread::sleep(Duration::from_secs(self.gate.settle_secs));
                Ok(true)
            }
            Err(BrowserError::ElementNotFound(what)) => {
                warn!("Age verification button vanished before click: {}", what);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.browser.close();
            self.closed = true;
            info!("Browser session released");
        }
    }
}

impl<B: Browser> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}
