use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;

use super::{SourceKind, Strategy};
use crate::error::ResolveError;
use crate::http_client::HttpClient;
use crate::normalizer;

/// Resolves a middleman page by reading the `href` of its coupon button.
///
/// Covers every source whose page is plain server-rendered HTML with an
/// anchor the site styles as a "get coupon" button. The selector is the only
/// thing that differs between these sources.
pub struct AnchorStrategy {
    source: String,
    http: Arc<HttpClient>,
    selector: String,
    pick_last: bool,
}

impl AnchorStrategy {
    pub fn new(source: &str, http: Arc<HttpClient>, selector: &str) -> Self {
        Self {
            source: source.to_string(),
            http,
            selector: selector.to_string(),
            pick_last: false,
        }
    }

    /// Match the last element instead of the first; some themes render the
    /// coupon button after several identically styled buttons.
    pub fn pick_last(mut self) -> Self {
        self.pick_last = true;
        self
    }
}

#[async_trait]
impl Strategy for AnchorStrategy {
    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Http
    }

    async fn resolve(&self, raw_url: &str) -> Result<Option<String>, ResolveError> {
        let html = self.http.get_text(raw_url).await?;
        let href = extract_href(&html, &self.selector, self.pick_last);
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

/// Pull the href out of the (first or last) element matching `selector`.
/// Parsing stays in a sync helper so the non-`Send` document never lives
/// across an await point.
fn extract_href(html: &str, selector: &str, pick_last: bool) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).ok()?;
    let mut matches = document.select(&selector);
    let element = if pick_last {
        matches.last()
    } else {
        matches.next()
    }?;
    element
        .value()
        .attr("href")
        .filter(|href| !href.is_empty())
        .map(|href| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_first_href() {
        let html = r#"
            <html><body>
              <a class="purple-button" href="https://target.example/course/abc?couponCode=X">Enroll</a>
            </body></html>
        "#;
        assert_eq!(
            extract_href(html, "a.purple-button", false),
            Some("https://target.example/course/abc?couponCode=X".to_string())
        );
    }

    #[test]
    fn test_extract_last_href() {
        let html = r#"
            <html><body>
              <a class="btn" href="https://mid.example/share">Share</a>
              <a class="btn" href="https://target.example/course/abc">Coupon</a>
            </body></html>
        "#;
        assert_eq!(
            extract_href(html, "a.btn", true),
            Some("https://target.example/course/abc".to_string())
        );
        assert_eq!(
            extract_href(html, "a.btn", false),
            Some("https://mid.example/share".to_string())
        );
    }

    #[test]
    fn test_missing_selector_is_none() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert_eq!(extract_href(html, "a.purple-button", false), None);
    }

    #[test]
    fn test_empty_href_is_none() {
        let html = r#"<html><body><a class="purple-button" href="">x</a></body></html>"#;
        assert_eq!(extract_href(html, "a.purple-button", false), None);
    }
}
