use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;

use super::config::BrowserConfig;
use crate::error::{FatalError, ResolveError};

/// Owns one browser process and provisions tabs for it.
///
/// Failure to launch the browser at all is fatal to the run; everything after
/// that (navigation, waits) is transient and handled by retry budgets.
pub struct BrowserManager {
    browser: Arc<Browser>,
    config: BrowserConfig,
}

impl BrowserManager {
    pub fn launch(config: BrowserConfig) -> Result<Self, BrowserError> {
        let images_arg = if config.disable_images {
            Some("--blink-settings=imagesEnabled=false".to_string())
        } else {
            None
        };
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--no-sandbox"),
        ];
        if let Some(ref img) = images_arg {
            args.push(OsStr::new(img));
        }
        if let Some(ref ua) = user_agent_arg {
            args.push(OsStr::new(ua));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .args(args)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            browser: Arc::new(browser),
            config,
        })
    }

    /// Open a fresh tab with webdriver fingerprints masked.
    pub fn new_tab(&self) -> Result<Arc<Tab>, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::Tab(e.to_string()))?;

        let stealth_script = r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
        "#;
        if let Err(e) = tab.evaluate(stealth_script, false) {
            log::debug!("stealth script injection failed: {}", e);
        }

        Ok(tab)
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

/// Errors raised by the browser layer.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("tab creation failed: {0}")]
    Tab(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timeout waiting for: {0}")]
    Timeout(String),

    #[error("script evaluation failed: {0}")]
    Script(String),
}

impl BrowserError {
    /// Launch and tab-provisioning failures abort the run; the rest are
    /// transient per-step failures.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::Launch(_) | BrowserError::Tab(_))
    }
}

impl From<BrowserError> for ResolveError {
    fn from(e: BrowserError) -> Self {
        ResolveError::Navigation(e.to_string())
    }
}

impl From<BrowserError> for FatalError {
    fn from(e: BrowserError) -> Self {
        FatalError::Session(e.to_string())
    }
}
