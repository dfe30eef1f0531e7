use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ConverterConfig;

const DEFAULT_USER_AGENT: &str = "wikicite/0.1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const SEARCH_LIMIT: usize = 100;

/// A page surfaced by a CQL search: enough identity to fetch and cite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub id: String,
    pub title: String,
}

/// Full page content with the rendered body, when the page has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub id: String,
    pub title: String,
    pub body_html: Option<String>,
}

/// The query/content provider seam. The conversion driver only talks to
/// this trait; tests substitute a mock.
pub trait ConfluenceApi {
    fn search(&mut self, cql: &str) -> Result<Vec<PageHandle>>;
    fn get_page(&mut self, id: &str) -> Result<Option<RemotePage>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct ConfluenceClientConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ConfluenceClientConfig {
    /// Resolve the client configuration: `CONFLUENCE_*` environment
    /// variables override the loaded config file.
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            base_url: env_value("CONFLUENCE_BASE_URL", &config.base_url),
            bearer_token: env::var("CONFLUENCE_BEARER_TOKEN")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .or_else(|| config.bearer_token.clone()),
            user_agent: env_value("CONFLUENCE_USER_AGENT", DEFAULT_USER_AGENT),
            timeout_ms: env_value_u64("CONFLUENCE_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
            rate_limit_ms: env_value_u64(
                "CONFLUENCE_RATE_LIMIT_MS",
                secs_to_millis(config.rate_limit_delay),
            ),
            max_retries: env_value_usize("CONFLUENCE_HTTP_RETRIES", config.max_retries),
            retry_delay_ms: env_value_u64(
                "CONFLUENCE_HTTP_RETRY_DELAY_MS",
                secs_to_millis(config.retry_delay),
            ),
        }
    }
}

/// Retry bookkeeping for one request: a fixed number of retries after the
/// initial attempt, each preceded by the fixed delay unless the server
/// supplied a wait hint.
#[derive(Debug)]
struct Backoff {
    remaining: usize,
    delay: Duration,
}

impl Backoff {
    fn new(max_retries: usize, delay: Duration) -> Self {
        Self {
            remaining: max_retries,
            delay,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    fn next_delay(&mut self, hint: Option<Duration>) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(hint.unwrap_or(self.delay))
    }
}

pub struct ConfluenceClient {
    client: Client,
    config: ConfluenceClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Confluence HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn from_converter_config(config: &ConverterConfig) -> Result<Self> {
        Self::new(ConfluenceClientConfig::from_config(config))
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{path}", self.base_url()))
            .with_context(|| format!("invalid Confluence base URL: {}", self.config.base_url))
    }

    /// GET with pacing and bounded retries. HTTP 404 maps to `Ok(None)`;
    /// a 429 honors a numeric `Retry-After` header as the wait hint.
    fn request_json_get(&mut self, url: Url, params: &[(&str, String)]) -> Result<Option<Value>> {
        let mut backoff = Backoff::new(
            self.config.max_retries,
            Duration::from_millis(self.config.retry_delay_ms),
        );

        loop {
            self.apply_rate_limit();
            let mut request = self
                .client
                .get(url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(params);
            if let Some(token) = &self.config.bearer_token {
                request = request.bearer_auth(token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !status.is_success() {
                        let hint = if status == StatusCode::TOO_MANY_REQUESTS {
                            retry_after_hint(&response)
                        } else {
                            None
                        };
                        if is_retryable_status(status)
                            && let Some(delay) = backoff.next_delay(hint)
                        {
                            sleep(delay);
                            continue;
                        }
                        bail!("Confluence API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode Confluence API JSON response")?;
                    return Ok(Some(payload));
                }
                Err(error) => {
                    if is_retryable_error(&error)
                        && let Some(delay) = backoff.next_delay(None)
                    {
                        sleep(delay);
                        continue;
                    }
                    return Err(error).context("failed to call Confluence API");
                }
            }
        }
    }

    /// Inter-request pacing. Scoped to this client instance; the sequential
    /// request path is the only writer.
    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl ConfluenceApi for ConfluenceClient {
    fn search(&mut self, cql: &str) -> Result<Vec<PageHandle>> {
        let url = self.endpoint("rest/api/content/search")?;
        let params = [
            ("cql", cql.to_string()),
            ("expand", "metadata.labels".to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
        ];

        let payload = match self.request_json_get(url, &params)? {
            Some(payload) => payload,
            None => return Ok(Vec::new()),
        };
        let parsed: SearchResponse = serde_json::from_value(payload)
            .context("failed to decode content search response")?;

        Ok(parsed
            .results
            .into_iter()
            .map(|item| PageHandle {
                id: item.id,
                title: item.title,
            })
            .collect())
    }

    fn get_page(&mut self, id: &str) -> Result<Option<RemotePage>> {
        let url = self.endpoint(&format!("rest/api/content/{id}"))?;
        let params = [("expand", "body.view,metadata.labels,space".to_string())];

        let payload = match self.request_json_get(url, &params)? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let parsed: ContentResponse =
            serde_json::from_value(payload).context("failed to decode page content response")?;

        let body_html = parsed
            .body
            .and_then(|body| body.view)
            .map(|view| view.value)
            .filter(|value| !value.is_empty());

        Ok(Some(RemotePage {
            id: parsed.id,
            title: parsed.title,
            body_html,
        }))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn retry_after_hint(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn secs_to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize)]
struct SearchResultItem {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<BodyPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct BodyPayload {
    #[serde(default)]
    view: Option<ViewPayload>,
}

#[derive(Debug, Deserialize)]
struct ViewPayload {
    value: String,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{Backoff, ContentResponse, SearchResponse, secs_to_millis};

    #[test]
    fn backoff_yields_exactly_the_retry_budget() {
        let mut backoff = Backoff::new(3, Duration::from_millis(500));
        assert_eq!(backoff.next_delay(None), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(None), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(None), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(None), None);
    }

    #[test]
    fn backoff_prefers_the_server_wait_hint() {
        let mut backoff = Backoff::new(2, Duration::from_millis(500));
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(30))),
            Some(Duration::from_secs(30))
        );
        assert_eq!(backoff.next_delay(None), Some(Duration::from_millis(500)));
    }

    #[test]
    fn zero_retries_exhausts_immediately() {
        let mut backoff = Backoff::new(0, Duration::from_millis(500));
        assert_eq!(backoff.next_delay(None), None);
    }

    #[test]
    fn seconds_convert_to_milliseconds() {
        assert_eq!(secs_to_millis(1.0), 1_000);
        assert_eq!(secs_to_millis(0.35), 350);
        assert_eq!(secs_to_millis(-1.0), 0);
    }

    #[test]
    fn search_response_decodes_results() {
        let payload = json!({
            "results": [
                {"id": "123", "title": "Test IG", "type": "page"},
                {"id": "456", "title": "Other IG", "type": "page"}
            ],
            "size": 2
        });
        let parsed: SearchResponse = serde_json::from_value(payload).expect("decode");
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].id, "123");
        assert_eq!(parsed.results[1].title, "Other IG");
    }

    #[test]
    fn empty_search_response_decodes() {
        let parsed: SearchResponse = serde_json::from_value(json!({})).expect("decode");
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn content_response_decodes_body_view() {
        let payload = json!({
            "id": "123",
            "title": "Test IG",
            "body": {"view": {"value": "<table></table>", "representation": "view"}}
        });
        let parsed: ContentResponse = serde_json::from_value(payload).expect("decode");
        assert_eq!(parsed.id, "123");
        let view = parsed.body.and_then(|body| body.view).expect("view");
        assert_eq!(view.value, "<table></table>");
    }

    #[test]
    fn content_response_tolerates_missing_body() {
        let payload = json!({"id": "123", "title": "Test IG"});
        let parsed: ContentResponse = serde_json::from_value(payload).expect("decode");
        assert!(parsed.body.is_none());
    }
}
