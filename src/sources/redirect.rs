use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;

use super::{SourceKind, Strategy};
use crate::error::ResolveError;
use crate::http_client::HttpClient;

/// Resolves sources whose links are affiliate redirects to the target site.
///
/// First follows the redirect chain directly; most links land on the target
/// host in one hop. Links pointing at the source's own shop page instead
/// carry a form whose `action` is the real redirect, so that is scraped and
/// followed as a fallback.
pub struct RedirectStrategy {
    source: String,
    http: Arc<HttpClient>,
    target_host: String,
    form_selector: String,
}

impl RedirectStrategy {
    pub fn new(source: &str, http: Arc<HttpClient>, target_host: &str, form_selector: &str) -> Self {
        Self {
            source: source.to_string(),
            http,
            target_host: target_host.to_string(),
            form_selector: form_selector.to_string(),
        }
    }

    fn lands_on_target(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == self.target_host || h.ends_with(&format!(".{}", self.target_host))))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Strategy for RedirectStrategy {
    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Http
    }

    async fn resolve(&self, raw_url: &str) -> Result<Option<String>, ResolveError> {
        let landed = self.http.final_url(raw_url).await?;
        if self.lands_on_target(&landed) {
            log::info!("{} ==> {}", raw_url, landed);
            return Ok(Some(landed));
        }

        // Shop-page link: read the form action and follow that instead.
        let html = self.http.get_text(&landed).await?;
        let action = match extract_form_action(&html, &self.form_selector) {
            Some(action) => action,
            None => return Ok(None),
        };
        let followed = self.http.final_url(&action).await?;
        if self.lands_on_target(&followed) {
            log::info!("{} ==> {}", raw_url, followed);
            Ok(Some(followed))
        } else {
            Ok(None)
        }
    }
}

fn extract_form_action(html: &str, selector: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("action")
        .filter(|action| !action.is_empty())
        .map(|action| action.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClient;

    fn strategy() -> RedirectStrategy {
        RedirectStrategy::new(
            "idownloadcoupon",
            Arc::new(HttpClient::new().unwrap()),
            "udemy.com",
            "form.cart",
        )
    }

    #[test]
    fn test_target_host_matching() {
        let s = strategy();
        assert!(s.lands_on_target("https://www.udemy.com/course/abc/?couponCode=X"));
        assert!(s.lands_on_target("https://udemy.com/course/abc"));
        assert!(!s.lands_on_target("https://mid.example/shop/abc"));
        assert!(!s.lands_on_target("https://udemy.com.evil.example/x"));
        assert!(!s.lands_on_target("not a url"));
    }

    #[test]
    fn test_extract_form_action() {
        let html = r#"
            <html><body>
              <form class="cart" action="https://go.example/redirect?murl=target" method="post">
                <button>Buy</button>
              </form>
            </body></html>
        "#;
        assert_eq!(
            extract_form_action(html, "form.cart"),
            Some("https://go.example/redirect?murl=target".to_string())
        );
        assert_eq!(extract_form_action(html, "form.checkout"), None);
    }
}
