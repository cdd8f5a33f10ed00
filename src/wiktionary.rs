//! Dictionary source backed by a MediaWiki `api.php` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{LookupError, Result};
use crate::source::{DEFAULT_PAGE_BASE, DictionarySource, SourceDocument, page_url};

pub const DEFAULT_ENDPOINT: &str = "https://en.wiktionary.org/w/api.php";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

/// API error codes that mean "no such page" rather than a failure.
const MISSING_PAGE_CODES: &[&str] = &["missingtitle", "invalidtitle"];

#[derive(Debug, Clone)]
pub struct WiktionaryConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for WiktionaryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct WiktionarySource {
    client: Client,
    config: WiktionaryConfig,
    page_base: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsedPage>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParsedPage {
    title: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

impl WiktionarySource {
    pub fn new(config: WiktionaryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        let page_base = page_base_for(&config.endpoint);
        Ok(Self {
            client,
            config,
            page_base,
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Network(format!(
                "{} returned HTTP {status}",
                self.config.endpoint
            )));
        }
        Ok(response.text().await?)
    }
}

/// `https://host/w/api.php` serves pages under `https://host/wiki/`.
fn page_base_for(endpoint: &str) -> String {
    match endpoint.strip_suffix("/w/api.php") {
        Some(host) => format!("{host}/wiki/"),
        None => DEFAULT_PAGE_BASE.to_string(),
    }
}

#[async_trait]
impl DictionarySource for WiktionarySource {
    async fn fetch_document(&self, title: &str) -> Result<Option<SourceDocument>> {
        debug!(title, "fetching page");
        let body = self
            .get(&[
                ("action", "parse"),
                ("page", title),
                ("prop", "text"),
                ("disableeditsection", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        let parsed: ParseResponse = serde_json::from_str(&body)
            .map_err(|err| LookupError::MalformedDocument(err.to_string()))?;
        match (parsed.parse, parsed.error) {
            (Some(page), _) => Ok(Some(SourceDocument {
                title: page.title,
                html: page.text,
            })),
            (None, Some(error)) if MISSING_PAGE_CODES.contains(&error.code.as_str()) => Ok(None),
            (None, Some(error)) => Err(LookupError::MalformedDocument(format!(
                "{}: {}",
                error.code, error.info
            ))),
            (None, None) => Err(LookupError::MalformedDocument(
                "parse response without page or error".to_string(),
            )),
        }
    }

    async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        debug!(query, limit, "searching titles");
        let limit = limit.to_string();
        let body = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|err| LookupError::MalformedDocument(err.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(LookupError::MalformedDocument(format!(
                "{}: {}",
                error.code, error.info
            )));
        }
        Ok(parsed
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    fn page_url(&self, title: &str, section: Option<&str>) -> String {
        page_url(&self.page_base, title, section)
    }
}
