use headless_chrome::Tab;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::manager::BrowserError;

/// Polling interval for wait loops.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// High-level driving primitives for one browser tab.
///
/// Everything element-level goes through `evaluate` rather than the CDP DOM
/// API: middleman pages rebuild their DOM aggressively and a fresh query per
/// poll is the only reading that stays valid.
pub struct PageDriver {
    tab: Arc<Tab>,
    default_timeout: Duration,
}

impl PageDriver {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self {
            tab,
            default_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(tab: Arc<Tab>, timeout: Duration) -> Self {
        Self {
            tab,
            default_timeout: timeout,
        }
    }

    /// Navigate to a URL and wait for the load to settle.
    pub fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::Navigation(format!("navigate to {}: {}", url, e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| BrowserError::Navigation(format!("load of {}: {}", url, e)))?;
        Ok(())
    }

    /// URL the tab currently shows.
    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    /// Evaluate a script and return its JSON value, if any.
    fn eval(&self, script: &str) -> Result<Option<serde_json::Value>, BrowserError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value)
    }

    /// Poll `script` until it evaluates to `true` or the timeout elapses.
    fn wait_for_true(&self, script: &str, timeout: Duration, what: &str) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            if let Ok(Some(value)) = self.eval(script) {
                if value.as_bool() == Some(true) {
                    return Ok(());
                }
            }
            if start.elapsed() > timeout {
                return Err(BrowserError::Timeout(what.to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for an element matching the CSS selector to exist.
    pub fn wait_for_selector(&self, selector: &str, timeout: Option<Duration>) -> Result<(), BrowserError> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        self.wait_for_true(&script, timeout.unwrap_or(self.default_timeout), selector)
    }

    /// Wait for the tab URL to contain `pattern`.
    pub fn wait_for_url_contains(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            if self.current_url().contains(pattern) {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(BrowserError::Timeout(format!("url containing {}", pattern)));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// The `href` of the first anchor whose text contains `text`, waiting up
    /// to `timeout` for it to appear. `Ok(None)` means the page finished
    /// loading without such an anchor.
    pub fn anchor_href_by_text(&self, text: &str, timeout: Duration) -> Result<Option<String>, BrowserError> {
        let script = format!(
            r#"(() => {{
                const anchors = document.querySelectorAll('a');
                for (const a of anchors) {{
                    if (a.textContent.includes({}) && a.href) return a.href;
                }}
                return null;
            }})()"#,
            js_string(text)
        );
        let start = Instant::now();
        loop {
            if let Some(value) = self.eval(&script)? {
                if let Some(href) = value.as_str() {
                    return Ok(Some(href.to_string()));
                }
            }
            if start.elapsed() > timeout {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// The value of `attribute` on the first element matching `selector`.
    pub fn attribute_of(&self, selector: &str, attribute: &str) -> Result<Option<String>, BrowserError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({});
                return el ? el.getAttribute({}) : null;
            }})()"#,
            js_string(selector),
            js_string(attribute)
        );
        Ok(self
            .eval(&script)?
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    /// True if an element matching `selector` exists, is rendered, and is not
    /// disabled. Used for affordance detection before clicking.
    pub fn is_displayed_enabled(&self, selector: &str) -> Result<bool, BrowserError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                if (el.disabled) return false;
                return el.offsetParent !== null;
            }})()"#,
            js_string(selector)
        );
        Ok(self
            .eval(&script)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// True if any element matching `selector` has text containing `text`.
    pub fn selector_has_text(&self, selector: &str, text: &str) -> Result<bool, BrowserError> {
        let script = format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({})) {{
                    if (el.textContent.includes({})) return true;
                }}
                return false;
            }})()"#,
            js_string(selector),
            js_string(text)
        );
        Ok(self
            .eval(&script)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Click the first displayed, enabled element matching `selector`.
    /// Returns false when no such element exists right now.
    pub fn click_if_present(&self, selector: &str) -> Result<bool, BrowserError> {
        let script = format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({})) {{
                    if (el.offsetParent !== null && !el.disabled) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#,
            js_string(selector)
        );
        Ok(self
            .eval(&script)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }
}

/// Quote a string for embedding into an evaluated script.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserConfig, BrowserManager};

    #[test]
    fn test_js_string_quoting() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("it's"), "\"it's\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    #[ignore] // Requires Chrome to be installed
    fn test_navigate_and_read() {
        let manager = BrowserManager::launch(BrowserConfig::default()).unwrap();
        let driver = PageDriver::new(manager.new_tab().unwrap());
        driver.navigate("https://example.com").unwrap();
        assert!(driver.current_url().contains("example.com"));
        assert!(driver.wait_for_selector("h1", None).is_ok());
    }
}
