use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser as Chrome, Element, LaunchOptions, Tab};
use tracing::debug;

use super::{Browser, BrowserError, CatalogEntry, Condition};
use crate::config::BrowserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Headless Chrome driven over the DevTools protocol.
pub struct ChromeBrowser {
    browser: Option<Chrome>,
    tab: Option<Arc<Tab>>,
}

impl ChromeBrowser {
    pub fn launch(settings: &BrowserSettings) -> Result<Self, BrowserError> {
        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some(settings.window_size))
            .idle_browser_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser = Chrome::new(options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(format!("Tab creation failed: {}", e)))?;

        if let Some(ua) = &settings.user_agent {
            tab.set_user_agent(ua, None, None)
                .map_err(|e| BrowserError::Launch(format!("Setting user agent failed: {}", e)))?;
        }

        debug!(headless = settings.headless, "Chrome launched");
        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
        })
    }

    fn tab(&self) -> Result<&Tab, BrowserError> {
        self.tab.as_deref().ok_or(BrowserError::Closed)
    }

    fn eval(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| BrowserError::JavaScript(e.to_string()))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate a boolean expression until it is true or the timeout passes.
    fn poll(&self, script: &str, timeout: Duration) -> Result<bool, BrowserError> {
        let start = Instant::now();
        loop {
            if self.eval(script)?.as_bool() == Some(true) {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// JS string literal for embedding selectors and needles into scripts.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn condition_script(condition: &Condition<'_>) -> String {
    match condition {
        Condition::Present(selector) => {
            format!("document.querySelector({}) !== null", js_str(selector))
        }
        Condition::ButtonText(needle) => format!(
            "Array.from(document.querySelectorAll('button')).some(b => (b.innerText || '').toLowerCase().includes({}))",
            js_str(&needle.to_lowercase())
        ),
    }
}

/// Only buttons are clickable by text; anything else has no target.
fn click_script(condition: &Condition<'_>) -> Option<String> {
    match condition {
        Condition::ButtonText(needle) => Some(format!(
            "(() => {{ const b = Array.from(document.querySelectorAll('button')).find(b => (b.innerText || '').toLowerCase().includes({})); if (!b) return false; b.click(); return true; }})()",
            js_str(&needle.to_lowercase())
        )),
        Condition::Present(_) => None,
    }
}

impl Browser for ChromeBrowser {
    fn open(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let tab = self.tab()?;
        tab.set_default_timeout(timeout);
        tab.navigate_to(url)
            .map_err(|e| BrowserError::Navigation(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::Navigation(format!("Navigation timeout for {}: {}", url, e)))?;
        Ok(())
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn CatalogEntry + '_>>, BrowserError> {
        // find_elements errors on zero matches, so count first
        if self.count(selector)? == 0 {
            return Ok(Vec::new());
        }
        let elements = self
            .tab()?
            .find_elements(selector)
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromeEntry { element }) as Box<dyn CatalogEntry + '_>)
            .collect())
    }

    fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        let script = format!("document.querySelectorAll({}).length", js_str(selector));
        Ok(self.eval(&script)?.as_u64().unwrap_or(0) as usize)
    }

    fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.eval("window.scrollTo(0, document.body.scrollHeight);")
            .map(|_| ())
            .map_err(|e| BrowserError::JavaScript(format!("Scroll failed: {}", e)))
    }

    fn wait_for(&self, condition: &Condition<'_>, timeout: Duration) -> Result<bool, BrowserError> {
        self.poll(&condition_script(condition), timeout)
    }

    fn click(&self, condition: &Condition<'_>) -> Result<(), BrowserError> {
        let clicked = match click_script(condition) {
            Some(script) => self.eval(&script)?.as_bool() == Some(true),
            None => false,
        };
        if clicked {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(format!("{:?}", condition)))
        }
    }

    fn close(&mut self) {
        // dropping the Browser kills the Chrome process
        let had_tab = self.tab.take().is_some();
        if self.browser.take().is_some() || had_tab {
            debug!("Chrome closed");
        }
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        self.close();
    }
}

struct ChromeEntry<'a> {
    element: Element<'a>,
}

impl CatalogEntry for ChromeEntry<'_> {
    fn text(&self) -> Result<String, BrowserError> {
        self.element
            .get_inner_text()
            .map_err(|e| BrowserError::StaleElement(e.to_string()))
    }

    fn link(&self) -> Result<Option<String>, BrowserError> {
        match self.element.find_element("a") {
            Ok(anchor) => anchor
                .get_attribute_value("href")
                .map_err(|e| BrowserError::StaleElement(e.to_string())),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_str_escapes_quotes() {
        assert_eq!(
            js_str(r#"[data-testid="product-list-item"]"#),
            r#""[data-testid=\"product-list-item\"]""#
        );
    }

    #[test]
    fn button_script_lowercases_needle() {
        let script = condition_script(&Condition::ButtonText("YES"));
        assert!(script.contains("\"yes\""));
    }

    #[test]
    fn only_buttons_are_clickable() {
        assert!(click_script(&Condition::ButtonText("Yes")).is_some());
        assert!(click_script(&Condition::Present("#age-gate")).is_none());
    }

    #[test]
    #[ignore] // Requires Chrome to be installed
    fn launch_and_close() {
        let mut browser = ChromeBrowser::launch(&BrowserSettings::default()).unwrap();
        browser.open("https://example.com", Duration::from_secs(30)).unwrap();
        assert!(browser.count("h1").unwrap() >= 1);
        browser.close();
        assert!(matches!(browser.count("h1"), Err(BrowserError::Closed)));
    }
}
