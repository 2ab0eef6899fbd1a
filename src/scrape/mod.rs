mod extract;
mod limiter;

pub use extract::{collapse_whitespace, get_data_from_page, PageData};
pub use limiter::{CancelToken, RateLimiter};

use reqwest::{header, StatusCode};
use std::{error::Error as _, time::Duration};

use crate::{
    config::ScrapeConfig,
    errors::{Error, Result},
};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::from(&ScrapeConfig::default())
    }
}

impl From<&ScrapeConfig> for ScrapeOptions {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            follow_redirects: config.follow_redirects,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub description: String,
    pub raw_content: String,
    pub clean_text: String,
    pub favicon_url: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ScrapedPage {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Builds a successful page from a fetched HTML document.
    pub fn from_html(url: &str, html: String) -> Self {
        let PageData {
            title,
            description,
            favicon_url,
            clean_text,
        } = get_data_from_page(&html, url);

        Self {
            url: url.to_string(),
            title,
            description,
            raw_content: html,
            clean_text,
            favicon_url,
            success: true,
            error: None,
        }
    }
}

/// Fetches one page. Implementations must return promptly once `cancel`
/// is set, apart from a request already on the wire.
pub trait Scraper: Send + Sync {
    fn scrape(&self, cancel: &CancelToken, url: &str, options: &ScrapeOptions) -> Result<ScrapedPage>;
}

/// Whether a failed attempt is worth repeating.
enum Attempt {
    Retry(String),
    Fatal(String),
}

fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

/// Plain HTTP scraper: blocking `reqwest`, a shared rate limiter, a fixed
/// delay between retries and HTML-only responses.
pub struct HtmlScraper {
    client: reqwest::blocking::Client,
    no_redirect_client: reqwest::blocking::Client,
    limiter: RateLimiter,
}

impl HtmlScraper {
    pub fn new(requests_per_second: f64) -> Result<Self> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::blocking::Client::builder()
                .redirect(policy)
                .pool_idle_timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| Error::Provider(format!("failed to build http client: {e}")))
        };

        Ok(Self {
            client: build(reqwest::redirect::Policy::default())?,
            no_redirect_client: build(reqwest::redirect::Policy::none())?,
            limiter: RateLimiter::new(requests_per_second),
        })
    }

    pub fn from_config(config: &ScrapeConfig) -> Result<Self> {
        Self::new(config.rate_limit_rps)
    }

    fn fetch_once(&self, url: &str, options: &ScrapeOptions) -> std::result::Result<String, Attempt> {
        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let resp = client
            .get(url)
            .timeout(options.timeout)
            .header(header::USER_AGENT, &options.user_agent)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .map_err(|e| {
                if e.is_builder() {
                    Attempt::Fatal(format!("invalid request: {}", get_error(&e)))
                } else {
                    Attempt::Retry(format!("request failed: {}", get_error(&e)))
                }
            })?;

        let status = resp.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            // no need to try again
            return Err(Attempt::Fatal(format!("HTTP error: {status}")));
        }
        if !status.is_success() {
            return Err(Attempt::Retry(format!("HTTP error: {status}")));
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("text/html") {
            return Err(Attempt::Fatal(format!(
                "non-HTML content type: {content_type:?}"
            )));
        }

        resp.text()
            .map_err(|e| Attempt::Retry(format!("failed to read body: {}", get_error(&e))))
    }
}

impl Scraper for HtmlScraper {
    fn scrape(&self, cancel: &CancelToken, url: &str, options: &ScrapeOptions) -> Result<ScrapedPage> {
        if !self.limiter.wait(cancel) {
            return Err(Error::Provider("scrape cancelled".to_string()));
        }

        let mut last_error = String::new();
        for attempt in 0..=options.max_retries {
            if attempt > 0 {
                log::debug!("{url}: retrying ({attempt}/{})", options.max_retries);
                if !cancel.sleep(options.retry_delay) {
                    return Err(Error::Provider("scrape cancelled".to_string()));
                }
            }

            log::debug!("{url}: requesting");
            match self.fetch_once(url, options) {
                Ok(html) => return Ok(ScrapedPage::from_html(url, html)),
                Err(Attempt::Fatal(e)) => {
                    log::warn!("{url}: {e}");
                    return Err(Error::Provider(e));
                }
                Err(Attempt::Retry(e)) => {
                    log::debug!("{url}: {e}");
                    last_error = e;
                }
            }
        }

        log::warn!("{url}: giving up: {last_error}");
        Err(Error::Provider(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let options = ScrapeOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.retry_delay, Duration::from_secs(2));
        assert_eq!(options.max_retries, 3);
        assert!(options.follow_redirects);
        assert!(options.user_agent.starts_with("BookmarkChat/1.0"));
    }

    #[test]
    fn test_page_from_html() {
        let html = r#"<html><head><title>Doc</title></head><body><p>Some text</p></body></html>"#;
        let page = ScrapedPage::from_html("https://example.com", html.to_string());
        assert!(page.success);
        assert_eq!(page.title, "Doc");
        assert_eq!(page.clean_text, "Some text");
        assert_eq!(page.raw_content, html);
        assert_eq!(page.favicon_url, "https://example.com/favicon.ico");
    }

    #[test]
    fn test_failed_page() {
        let page = ScrapedPage::failed("https://example.com", "boom");
        assert!(!page.success);
        assert_eq!(page.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_invalid_url_fails_without_retry() {
        let scraper = HtmlScraper::new(100.0).unwrap();
        let options = ScrapeOptions {
            retry_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let err = scraper
            .scrape(&CancelToken::new(), "not a url", &options)
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn test_cancelled_before_fetch() {
        let scraper = HtmlScraper::new(100.0).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = scraper
            .scrape(&cancel, "https://example.com", &ScrapeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    #[ignore]
    fn test_scrape_live_page() {
        let scraper = HtmlScraper::new(2.0).unwrap();
        let page = scraper
            .scrape(&CancelToken::new(), "https://example.com", &ScrapeOptions::default())
            .unwrap();
        assert!(page.success);
        assert!(!page.title.is_empty());
    }
}
