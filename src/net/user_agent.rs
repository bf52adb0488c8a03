//! User-Agent strings for outbound HTTP traffic.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/drug-enricher";

/// Browser-style agent for general web pages, many of which reject tool agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User-Agent for open-data API and model requests (identifies the tool).
#[must_use]
pub fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("drug-enricher/{version} (catalog-enrichment; +{PROJECT_UA_URL})")
}

/// User-Agent for search result pages and fetched articles.
#[must_use]
pub fn default_page_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}
