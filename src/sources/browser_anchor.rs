use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{SourceKind, Strategy};
use crate::browser::{BrowserManager, PageDriver};
use crate::error::ResolveError;
use crate::normalizer;

/// Resolves JavaScript-rendered middleman pages through the browser session.
///
/// The coupon link only exists after client-side rendering, so the page is
/// opened in a tab and the anchor is located by its button text. The session
/// has shared navigation state; [`SourceKind::Browser`] makes the pipeline
/// run this strategy single-file.
pub struct BrowserAnchorStrategy {
    source: String,
    manager: Arc<BrowserManager>,
    button_text: String,
    timeout: Duration,
}

impl BrowserAnchorStrategy {
    pub fn new(
        source: &str,
        manager: Arc<BrowserManager>,
        button_text: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            source: source.to_string(),
            manager,
            button_text: button_text.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Strategy for BrowserAnchorStrategy {
    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Browser
    }

    async fn resolve(&self, raw_url: &str) -> Result<Option<String>, ResolveError> {
        let manager = self.manager.clone();
        let url = raw_url.to_string();
        let text = self.button_text.clone();
        let timeout = self.timeout;

        // headless_chrome is a blocking API; keep it off the async workers.
        let href = tokio::task::spawn_blocking(move || -> Result<Option<String>, ResolveError> {
            let tab = manager.new_tab().map_err(ResolveError::from)?;
            let driver = PageDriver::with_timeout(tab, timeout);
            driver.navigate(&url).map_err(ResolveError::from)?;
            let href = driver
                .anchor_href_by_text(&text, timeout)
                .map_err(ResolveError::from)?;
            if let Err(e) = driver.tab().close(true) {
                log::debug!("tab close after {}: {}", url, e);
            }
            Ok(href)
        })
        .await
        .map_err(|e| ResolveError::Navigation(format!("browser task: {}", e)))??;

        match href {
            Some(href) => {
                let cleaned = normalizer::strip_tracking(&href);
                log::info!("{} ==> {}", raw_url, cleaned);
                Ok(Some(cleaned))
            }
            None => Ok(None),
        }
    }
}
