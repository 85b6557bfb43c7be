use rand::Rng;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::HttpConfig;
use crate::error::ResolveError;

/// User agents to rotate through to avoid bot detection
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// HTTP client shared by all pure-HTTP resolution strategies.
///
/// Wraps reqwest with a per-request retry loop (retryable statuses and
/// connection-level failures, exponential backoff with jitter) and rotating
/// user agents. Safe to share across worker tasks; reqwest's `Client` is an
/// `Arc` internally.
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpConfig::default())
    }

    pub fn with_config(config: HttpConfig) -> Result<Self, reqwest::Error> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(random_user_agent())
            .cookie_store(config.enable_cookies)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if config.enable_compression {
            builder = builder.gzip(true).brotli(true);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("static header"),
        );
        headers.insert("Accept-Language", "en-US,en;q=0.9".parse().expect("static header"));
        headers.insert("Upgrade-Insecure-Requests", "1".parse().expect("static header"));
        builder = builder.default_headers(headers);

        let client = builder.build()?;
        Ok(Self { client, config })
    }

    /// Exponential backoff with ±25% jitter to avoid thundering herd.
    fn retry_delay(&self, attempt: usize) -> Duration {
        let base = self.config.initial_retry_delay_ms;
        let capped = (base * 2u64.pow(attempt as u32)).min(self.config.max_retry_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status.as_u16(),
            // Rate limiting, server errors, CDN edge errors
            429 | 500 | 502 | 503 | 504 | 520..=527
        )
    }

    /// Fetch a URL, retrying retryable statuses and connection failures up to
    /// the configured budget. Non-retryable error statuses are returned as-is;
    /// strategies decide what a 404 means for their source.
    pub async fn get_with_retry(&self, url: &str) -> Result<Response, ResolveError> {
        let mut last_error: Option<ResolveError> = None;

        for attempt in 0..=self.config.max_retries {
            let request = self
                .client
                .get(url)
                .header("User-Agent", random_user_agent());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if Self::is_retryable_status(status) && attempt < self.config.max_retries {
                        log::warn!(
                            "retryable status {} for {}, attempt {}/{}",
                            status,
                            url,
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                        last_error =
                            Some(ResolveError::Network(format!("status {} from {}", status, url)));
                        sleep(self.retry_delay(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                    if retryable && attempt < self.config.max_retries {
                        log::warn!(
                            "request failed for {}, attempt {}/{}: {}",
                            url,
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                        last_error = Some(e.into());
                        sleep(self.retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ResolveError::Network(format!("retries exhausted for {}", url))))
    }

    /// Fetch a URL and return the body text.
    pub async fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        let response = self.get_with_retry(url).await?;
        response.text().await.map_err(ResolveError::from)
    }

    /// Follow the redirect chain of `url` and return the final URL.
    /// reqwest follows redirects by default; the landing URL is on the
    /// response.
    pub async fn final_url(&self, url: &str) -> Result<String, ResolveError> {
        let response = self.get_with_retry(url).await?;
        Ok(response.url().to_string())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn random_user_agent() -> &'static str {
    let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_random_user_agent() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[test]
    fn test_retry_delay_grows() {
        let client = HttpClient::new().unwrap();
        let d0 = client.retry_delay(0);
        let d3 = client.retry_delay(3);
        assert!(d0.as_millis() > 0);
        // With max jitter on d0 and min jitter on d3 the ordering still holds
        // for a 2^3 spread.
        assert!(d3.as_millis() > d0.as_millis());
    }

    #[test]
    fn test_retry_delay_capped() {
        let client = HttpClient::new().unwrap();
        let config = HttpConfig::default();
        let d = client.retry_delay(20);
        assert!(d.as_millis() as u64 <= config.max_retry_delay_ms * 5 / 4);
    }

    #[test]
    fn test_retryable_status() {
        assert!(HttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(HttpClient::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!HttpClient::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!HttpClient::is_retryable_status(StatusCode::FORBIDDEN));
    }
}
