//! Web search and page text capabilities used by [`super::WebSearchProbe`].
//!
//! Both are traits so the probe can be driven by test doubles; the provided
//! implementations talk HTTP and parse HTML with `scraper`.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::fields::truncate_chars;
use crate::net::{
    FetchError, HttpSettings, RetryPolicy, build_http_client, default_page_user_agent,
    run_with_retry,
};

/// Default HTML search endpoint; the query is appended as `q=`.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Maximum characters kept from one fetched page.
pub const MAX_PAGE_CHARS: usize = 1000;

const RESULT_LINK_SELECTOR: &str = "a.result__a";
const REDIRECT_TARGET_PARAM: &str = "uddg";
const HIDDEN_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "head", "template"];

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

/// Returns result URLs for a free-text query.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Returns at most `limit` result URLs in ranking order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, FetchError>;
}

/// Turns one URL into readable text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns its readable text, already truncated.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Scrapes an HTML results page (DuckDuckGo HTML layout).
#[derive(Debug)]
pub struct HtmlSearchEngine {
    client: Client,
    endpoint: String,
    policy: RetryPolicy,
}

impl HtmlSearchEngine {
    /// Creates an engine for `endpoint` (use [`DEFAULT_SEARCH_ENDPOINT`] in production).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if HTTP client construction fails.
    pub fn new(endpoint: &str, settings: &HttpSettings, policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = build_http_client("search", &default_page_user_agent(), settings)?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            policy,
        })
    }

    fn query_url(&self, query: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{separator}q={}", self.endpoint, urlencoding::encode(query))
    }

    async fn fetch_results_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        response.text().await.map_err(|e| FetchError::from_reqwest(url, e))
    }
}

#[async_trait]
impl SearchEngine for HtmlSearchEngine {
    #[tracing::instrument(skip(self), fields(engine = "html"))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, FetchError> {
        let url = self.query_url(query);
        let page = run_with_retry(&self.policy, "search", || self.fetch_results_page(&url))
            .await
            .map_err(|(error, _)| error)?;
        let base = Url::parse(&url).map_err(|_| FetchError::InvalidUrl { url: url.clone() })?;

        let links = extract_result_links(&page, &base, limit);
        debug!(results = links.len(), "Search finished");
        Ok(links)
    }
}

/// Extracts up to `limit` distinct http(s) result links from a results page.
///
/// Redirect links carrying the target in a `uddg` parameter are unwrapped.
fn extract_result_links(page: &str, base: &Url, limit: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse(RESULT_LINK_SELECTOR) else {
        return Vec::new();
    };
    let document = Html::parse_document(page);

    let mut links: Vec<String> = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
    {
        let Some(target) = resolve_result_href(href, base) else {
            continue;
        };
        if !links.contains(&target) {
            links.push(target);
        }
        if links.len() >= limit {
            break;
        }
    }
    links
}

fn resolve_result_href(href: &str, base: &Url) -> Option<String> {
    let url = base.join(href).ok()?;
    let unwrapped = url
        .query_pairs()
        .find(|(key, _)| key == REDIRECT_TARGET_PARAM)
        .and_then(|(_, value)| Url::parse(&value).ok());
    let target = unwrapped.unwrap_or(url);

    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}

/// Fetches pages over HTTP and extracts their visible text.
#[derive(Debug)]
pub struct HttpPageFetcher {
    client: Client,
    policy: RetryPolicy,
    polite_delay: Option<(Duration, Duration)>,
    max_chars: usize,
}

impl HttpPageFetcher {
    /// Creates a fetcher that waits a random 1 to 3 seconds before each fetch.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if HTTP client construction fails.
    pub fn new(settings: &HttpSettings, policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = build_http_client("page_fetch", &default_page_user_agent(), settings)?;
        Ok(Self {
            client,
            policy,
            polite_delay: Some((Duration::from_secs(1), Duration::from_secs(3))),
            max_chars: MAX_PAGE_CHARS,
        })
    }

    /// Replaces the random pre-fetch delay range; `None` disables it.
    #[must_use]
    pub fn with_polite_delay(mut self, range: Option<(Duration, Duration)>) -> Self {
        self.polite_delay = range;
        self
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        response.text().await.map_err(|e| FetchError::from_reqwest(url, e))
    }

    fn next_delay(&self) -> Option<Duration> {
        let (min, max) = self.polite_delay?;
        if max <= min {
            return Some(min);
        }
        let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
        Some(Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX)))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        if let Some(delay) = self.next_delay() {
            tokio::time::sleep(delay).await;
        }
        let html = run_with_retry(&self.policy, "page_fetch", || self.fetch_html(url))
            .await
            .map_err(|(error, _)| error)?;
        Ok(extract_readable_text(&html, self.max_chars))
    }
}

/// Extracts visible text from an HTML document.
///
/// Text inside `script`, `style`, `noscript`, `head` and `template` is
/// dropped, whitespace runs collapse to one space, and the result is
/// truncated to `max_chars` characters.
#[must_use]
pub fn extract_readable_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.tree.nodes() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    let collapsed = WHITESPACE_RUN.replace_all(&text, " ");
    truncate_chars(collapsed.trim(), max_chars)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_readable_text_drops_hidden_elements() {
        let html = r"<html><head><title>T</title><style>p{}</style></head>
            <body><script>var x = 1;</script><p>Take   one
            tablet</p><noscript>enable js</noscript><div>daily</div></body></html>";

        let text = extract_readable_text(html, MAX_PAGE_CHARS);

        assert_eq!(text, "Take one tablet daily");
    }

    #[test]
    fn test_extract_readable_text_truncates() {
        let html = format!("<p>{}</p>", "藥".repeat(1500));
        assert_eq!(extract_readable_text(&html, MAX_PAGE_CHARS).chars().count(), 1000);
    }

    #[test]
    fn test_extract_result_links_unwraps_redirects_and_dedupes() {
        let page = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.drugs.com%2Fa.html&rut=x">A</a>
            <a class="result__a" href="https://example.org/b">B</a>
            <a class="result__a" href="https://example.org/b">B again</a>
            <a class="other" href="https://example.org/ignored">C</a>
            <a class="result__a" href="javascript:void(0)">D</a>
            <a class="result__a" href="https://example.org/c">E</a>
        "#;
        let base = Url::parse("https://html.duckduckgo.com/html/?q=x").unwrap();

        let links = extract_result_links(page, &base, 3);

        assert_eq!(
            links,
            vec![
                "https://www.drugs.com/a.html".to_string(),
                "https://example.org/b".to_string(),
                "https://example.org/c".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_result_links_respects_limit() {
        let page = r#"<a class="result__a" href="https://a.example/1">1</a>
                      <a class="result__a" href="https://a.example/2">2</a>"#;
        let base = Url::parse("https://html.duckduckgo.com/html/").unwrap();
        assert_eq!(extract_result_links(page, &base, 1).len(), 1);
    }

    #[test]
    fn test_query_url_encodes_query() {
        let engine = HtmlSearchEngine::new(
            "http://127.0.0.1:9/html/",
            &HttpSettings::default(),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            engine.query_url("藥 dosage"),
            "http://127.0.0.1:9/html/?q=%E8%97%A5%20dosage"
        );
    }

    #[test]
    fn test_next_delay_disabled() {
        let fetcher = HttpPageFetcher::new(&HttpSettings::default(), RetryPolicy::default())
            .unwrap()
            .with_polite_delay(None);
        assert!(fetcher.next_delay().is_none());
    }
}
