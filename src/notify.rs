//! Best-effort push notifications for run progress.
//!
//! Posts to a gotify-style endpoint. A notifier failure is never allowed to
//! affect the run; errors are logged and swallowed. Left unconfigured, every
//! send is a no-op.

use serde_json::json;
use std::time::Duration;

use crate::config::NotifyConfig;

pub struct Notifier {
    client: reqwest::Client,
    base_url: String,
    app_token: String,
    enabled: bool,
}

impl Notifier {
    pub fn from_config(config: &NotifyConfig) -> Self {
        let enabled = !config.base_url.is_empty() && !config.app_token.is_empty();
        if !enabled {
            log::debug!("notifier not configured, notifications disabled");
        }
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_token: config.app_token.clone(),
            enabled,
        }
    }

    pub async fn send(&self, title: &str, message: &str) {
        if !self.enabled {
            return;
        }
        let url = format!("{}/message", self.base_url);
        let body = json!({
            "title": title,
            "message": message,
            "priority": 5,
        });
        let result = self
            .client
            .post(&url)
            .header("X-Gotify-Key", &self.app_token)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                log::error!("notification rejected with status {}", response.status());
            }
            Ok(_) => {}
            Err(e) => log::error!("failed to send notification: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_notifier_is_noop() {
        let notifier = Notifier::from_config(&NotifyConfig::default());
        assert!(!notifier.enabled);
        // Must return without attempting any request.
        notifier.send("title", "message").await;
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let notifier = Notifier::from_config(&NotifyConfig {
            base_url: "https://push.example/".to_string(),
            app_token: "token".to_string(),
        });
        assert!(notifier.enabled);
        assert_eq!(notifier.base_url, "https://push.example");
    }
}
