use std::time::Duration;

use crate::config::BrowserSettings;

/// Launch-time browser options.
#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub timeout: Duration,
    pub disable_images: bool,
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            timeout: Duration::from_secs(30),
            disable_images: true, // Faster loading
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl BrowserConfig {
    /// Build from the toml settings, with an explicit headless override:
    /// resolution runs headless, enrollment usually wants a visible window.
    pub fn from_settings(settings: &BrowserSettings, headless: bool) -> Self {
        Self {
            headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            timeout: Duration::from_secs(settings.timeout_secs),
            disable_images: settings.disable_images && headless,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_headless() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.disable_images);
    }

    #[test]
    fn test_visible_session_keeps_images() {
        let settings = BrowserSettings::default();
        let config = BrowserConfig::from_settings(&settings, false);
        assert!(!config.headless);
        // A visible enrollment session should render the page normally.
        assert!(!config.disable_images);
    }
}
