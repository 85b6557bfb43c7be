//! Per-source resolution strategies.
//!
//! Each middleman site hides the course link behind its own page structure:
//! a styled coupon button, a shop form posting to an affiliate redirect, or a
//! JavaScript-rendered anchor. A [`Strategy`] encapsulates exactly that
//! extraction step for one source; the registry maps source identifiers to
//! strategy instances so the pipeline can stay source-agnostic.
//!
//! Strategies backed by plain HTTP are stateless and safe to call from many
//! workers. Browser-backed strategies share one session and must run at
//! concurrency 1; the pipeline reads [`Strategy::kind`] to enforce that.

pub mod anchor;
pub mod browser_anchor;
pub mod redirect;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::BrowserManager;
use crate::error::ResolveError;
use crate::http_client::HttpClient;

pub use anchor::AnchorStrategy;
pub use browser_anchor::BrowserAnchorStrategy;
pub use redirect::RedirectStrategy;

/// How a strategy reaches its source, which decides its concurrency limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Independent stateless HTTP calls; any worker count is safe.
    Http,
    /// Drives a shared browser session; workers clamped to 1.
    Browser,
}

/// One source's link transformation: raw middleman URL in, canonical course
/// URL out. `Ok(None)` is a miss for this attempt (selector not found) and
/// is retryable, since interstitial and loading states can resolve on retry.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn source(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn resolve(&self, raw_url: &str) -> Result<Option<String>, ResolveError>;
}

/// Maps source identifiers to their strategies.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies
            .insert(strategy.source().to_string(), strategy);
    }

    pub fn get(&self, source: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(source)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Host the resolved links must land on.
pub const TARGET_HOST: &str = "udemy.com";

/// Sources whose strategy drives a browser session. A session is only
/// launched for the resolution phase when the batch contains one of these.
pub const BROWSER_SOURCES: &[&str] = &["freewebcart", "line51"];

/// Wire up the known middleman sources.
///
/// The CSS selectors and button texts here are configuration data per source,
/// not logic; the extraction logic lives in the three strategy types. Browser
/// strategies are only registered when a browser session was provisioned.
pub fn default_registry(
    http: Arc<HttpClient>,
    browser: Option<Arc<BrowserManager>>,
    browser_timeout: Duration,
) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();

    registry.register(Arc::new(AnchorStrategy::new(
        "easylearn",
        http.clone(),
        "a.purple-button",
    )));
    registry.register(Arc::new(AnchorStrategy::new(
        "coursetreat",
        http.clone(),
        "a.btn-couponbtn",
    )));
    registry.register(Arc::new(AnchorStrategy::new(
        "inventhigh",
        http.clone(),
        "a#couponval",
    )));
    registry.register(Arc::new(AnchorStrategy::new(
        "webhelperapp",
        http.clone(),
        "a.wp-block-button__link",
    )));
    // The coupon button is the last of several identically styled buttons.
    registry.register(Arc::new(
        AnchorStrategy::new(
            "coursecouponz",
            http.clone(),
            "a.elementor-button.elementor-button-link.elementor-size-sm",
        )
        .pick_last(),
    ));
    registry.register(Arc::new(RedirectStrategy::new(
        "idownloadcoupon",
        http.clone(),
        TARGET_HOST,
        "form.cart",
    )));

    if let Some(browser) = browser {
        registry.register(Arc::new(BrowserAnchorStrategy::new(
            "freewebcart",
            browser.clone(),
            "Get 100% OFF Coupon",
            browser_timeout,
        )));
        registry.register(Arc::new(BrowserAnchorStrategy::new(
            "line51",
            browser,
            "Get Discount Now",
            browser_timeout,
        )));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_http_sources() {
        let http = Arc::new(HttpClient::new().unwrap());
        let registry = default_registry(http, None, Duration::from_secs(10));

        for source in [
            "easylearn",
            "coursetreat",
            "inventhigh",
            "webhelperapp",
            "coursecouponz",
            "idownloadcoupon",
        ] {
            let strategy = registry.get(source).expect(source);
            assert_eq!(strategy.source(), source);
            assert_eq!(strategy.kind(), SourceKind::Http);
        }
        // Browser sources absent without a session.
        assert!(registry.get("freewebcart").is_none());
        assert!(registry.get("line51").is_none());
        assert!(registry.get("unknown").is_none());
    }
}
