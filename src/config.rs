use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, loaded from `config.toml` next to the binary.
/// Missing file or unparsable content falls back to defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Per-source resolution settings, keyed by source identifier. Sources
    /// not listed here use [`SourceConfig::default`].
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub enroll: EnrollConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Retry/concurrency/timeout budget for one source's resolution strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Worker-pool size. Clamped to 1 at runtime for browser-backed sources.
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub max_retries: usize,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub enable_cookies: bool,

    #[serde(default = "default_true")]
    pub enable_compression: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub disable_images: bool,
}

/// Settings for the enrollment state machine.
#[derive(Debug, Deserialize, Clone)]
pub struct EnrollConfig {
    #[serde(default = "default_retries")]
    pub retries: usize,

    #[serde(default = "default_enroll_timeout")]
    pub timeout_secs: u64,

    /// Enrollment runs in a visible window unless overridden; some course
    /// pages behave differently under headless mode.
    #[serde(default = "default_false")]
    pub headless: bool,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub app_token: String,
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_retries() -> usize { 3 }
fn default_threads() -> usize { 2 }
fn default_timeout() -> u64 { 30 }
fn default_enroll_timeout() -> u64 { 10 }
fn default_initial_retry_delay() -> u64 { 500 }
fn default_max_retry_delay() -> u64 { 8000 }
fn default_window_width() -> u32 { 1920 }
fn default_window_height() -> u32 { 1080 }
fn default_backoff_base() -> u64 { 750 }
fn default_data_dir() -> String { "data".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            threads: default_threads(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            enable_cookies: true,
            enable_compression: true,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            timeout_secs: default_timeout(),
            disable_images: true,
        }
    }
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_enroll_timeout(),
            headless: false,
            backoff_base_ms: default_backoff_base(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sources: HashMap::new(),
            http: HttpConfig::default(),
            browser: BrowserSettings::default(),
            enroll: EnrollConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("config.toml invalid, using defaults: {}", e),
                }
            }
        }
        Self::default()
    }

    /// Settings for `source`, falling back to defaults for unlisted sources.
    pub fn source(&self, source: &str) -> SourceConfig {
        self.sources.get(source).cloned().unwrap_or_default()
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EnrollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.source("anything").retries, 3);
        assert_eq!(cfg.http.max_retries, 3);
        assert!(cfg.browser.headless);
        assert!(!cfg.enroll.headless);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            data_dir = "out"

            [sources.idownloadcoupon]
            retries = 5
            threads = 25

            [enroll]
            retries = 2
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.data_dir, "out");
        assert_eq!(cfg.source("idownloadcoupon").retries, 5);
        assert_eq!(cfg.source("idownloadcoupon").threads, 25);
        // Unspecified field falls back to the serde default.
        assert_eq!(cfg.source("idownloadcoupon").timeout_secs, 30);
        assert_eq!(cfg.enroll.retries, 2);
        assert_eq!(cfg.source("unlisted").threads, 2);
    }
}
