//! Web tools for xiaoclaw
//!
//! `web_search` scrapes the DuckDuckGo HTML endpoint (no API key needed) and
//! `web_fetch` downloads a page and reduces it to readable text.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Result, XiaoError};
use crate::utils::string::truncate_chars;

use super::types::required_str;
use super::{Tool, ToolContext};

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const WEB_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) xiaoclaw";
const DEFAULT_SEARCH_COUNT: usize = 5;
const MAX_SEARCH_COUNT: usize = 10;
/// Default character cap for `web_fetch`.
pub const DEFAULT_FETCH_MAX_CHARS: usize = 8_000;
/// Bounds applied to a requested `max_chars`.
pub const MIN_FETCH_CHARS: usize = 256;
pub const MAX_FETCH_CHARS: usize = 20_000;
/// Bytes read from a response body before it is cut off. The 4x headroom
/// covers multibyte text and markup stripped by `html_to_text`.
const MAX_FETCH_BYTES: usize = MAX_FETCH_CHARS * 4;

static SCRIPT_STYLE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").ok());
static TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[^>]+>").ok());

fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(WEB_USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl std::fmt::Display for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]({})\n{}", self.title, self.url, self.snippet)
    }
}

/// Extract up to `count` results from a DuckDuckGo HTML result page.
pub fn parse_ddg_results(html: &str, count: usize) -> Vec<SearchResult> {
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let title = normalize_whitespace(&link.text().collect::<String>());
            if title.is_empty() {
                return None;
            }
            let url = link.value().attr("href").unwrap_or_default().to_string();
            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(|s| normalize_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();
            Some(SearchResult {
                title,
                url,
                snippet,
            })
        })
        .take(count)
        .collect()
}

/// Web search tool backed by DuckDuckGo.
pub struct WebSearchTool {
    client: Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: http_client(10),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return titles, URLs and snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": {
                    "type": "integer",
                    "description": "Number of results (default: 5)",
                    "minimum": 1,
                    "maximum": MAX_SEARCH_COUNT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let query = required_str(&args, "query")?.trim();
        if query.is_empty() {
            return Ok("Error: empty query".to_string());
        }
        let count = args
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_SEARCH_COUNT))
            .unwrap_or(DEFAULT_SEARCH_COUNT);

        let response = match self
            .client
            .get(DDG_HTML_URL)
            .query(&[("q", query)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "web_search request failed");
                return Ok(format!("Error: search failed: {}", e));
            }
        };
        let body = match read_body_limited(response, MAX_FETCH_BYTES).await {
            Ok(body) => body,
            Err(e) => return Ok(format!("Error: fetch failed: {}", e)),
        };

        let results = parse_ddg_results(&body, count);
        if results.is_empty() {
            return Ok(format!("No results for: {}", query));
        }
        Ok(results
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Web fetch tool returning readable page text.
pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: http_client(15),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its readable text content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http/https URL to fetch" },
                "max_chars": { "type": "integer", "description": "Maximum output characters (default: 8000)" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let url = required_str(&args, "url")?.trim();
        if url.is_empty() {
            return Ok("Error: empty URL".to_string());
        }
        let parsed = match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(_) => return Ok("Error: only http/https URLs are supported".to_string()),
            Err(e) => return Ok(format!("Error: invalid URL '{}': {}", url, e)),
        };
        let max_chars = args
            .get("max_chars")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(MIN_FETCH_CHARS, MAX_FETCH_CHARS))
            .unwrap_or(DEFAULT_FETCH_MAX_CHARS);

        let response = match self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url = url, error = %e, "web_fetch request failed");
                return Ok(format!("Error: fetch failed: {}", e));
            }
        };

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let body = match read_body_limited(response, MAX_FETCH_BYTES).await {
            Ok(body) => body,
            Err(e) => return Ok(format!("Error: fetch failed: {}", e)),
        };

        if is_json {
            return Ok(truncate_chars(&body, max_chars));
        }
        let text = html_to_text(&body);
        if text.is_empty() {
            return Ok("(empty page)".to_string());
        }
        Ok(truncate_chars(&text, max_chars))
    }
}

/// Read at most `max_bytes` of a response body, dropping the rest.
async fn read_body_limited(mut response: reqwest::Response, max_bytes: usize) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < max_bytes {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(max_bytes - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                return Err(XiaoError::Tool(format!("failed to read response body: {}", e)));
            }
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Drop scripts, styles and tags, decode common entities and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    if let Some(re) = SCRIPT_STYLE_RE.as_ref() {
        text = re.replace_all(&text, "").into_owned();
    }
    if let Some(re) = TAG_RE.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    normalize_whitespace(&decode_common_html_entities(&text))
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_common_html_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r#"
        <html><body>
          <div class="result results_links">
            <h2><a rel="nofollow" class="result__a" href="https://www.rust-lang.org/">Rust <b>Programming</b> Language</a></h2>
            <a class="result__snippet" href="https://www.rust-lang.org/">A language empowering everyone.</a>
          </div>
          <div class="result results_links">
            <h2><a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a></h2>
          </div>
          <div class="result"><h2><a class="result__a" href="https://empty.example"> </a></h2></div>
        </body></html>
    "#;

    #[test]
    fn test_parse_ddg_results() {
        let results = parse_ddg_results(DDG_PAGE, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust Programming Language");
        assert_eq!(results[0].url, "https://www.rust-lang.org/");
        assert_eq!(results[0].snippet, "A language empowering everyone.");
        assert_eq!(
            results[0].to_string(),
            "[Rust Programming Language](https://www.rust-lang.org/)\nA language empowering everyone."
        );
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_ddg_results_respects_count() {
        assert_eq!(parse_ddg_results(DDG_PAGE, 1).len(), 1);
        assert!(parse_ddg_results("<html></html>", 5).is_empty());
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>alert("x")</script></head>
            <body><h1>Title</h1><p>Fish &amp; chips &lt;3&nbsp;today</p></body></html>"#;
        assert_eq!(html_to_text(html), "Title Fish & chips <3 today");
    }

    #[test]
    fn test_decode_entities_amp_last() {
        assert_eq!(decode_common_html_entities("&amp;lt;"), "&lt;");
    }

    #[tokio::test]
    async fn test_web_fetch_rejects_bad_urls() {
        let tool = WebFetchTool::new();
        let out = tool
            .execute(json!({"url": "ftp://example.com"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out, "Error: only http/https URLs are supported");

        let out = tool
            .execute(json!({"url": "not a url"}), &ToolContext::new())
            .await
            .unwrap();
        assert!(out.starts_with("Error: invalid URL"));
    }

    /// Serve one HTTP response on a local port and return its URL.
    async fn serve_once(content_type: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            // The client may hang up once it has read enough.
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_web_fetch_clamps_requested_max_chars() {
        let url = serve_once("application/json", "好".repeat(300_000)).await;
        let out = WebFetchTool::new()
            .execute(json!({"url": url, "max_chars": 10_000_000}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out.chars().count(), MAX_FETCH_CHARS);
        assert!(out.chars().all(|c| c == '好'));
    }

    #[tokio::test]
    async fn test_read_body_limited_stops_at_byte_cap() {
        let url = serve_once("text/plain", "a".repeat(500_000)).await;
        let response = reqwest::get(&url).await.unwrap();
        let body = read_body_limited(response, 1_000).await.unwrap();
        assert_eq!(body.len(), 1_000);
    }

    #[tokio::test]
    async fn test_web_search_empty_query() {
        let out = WebSearchTool::new()
            .execute(json!({"query": "   "}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out, "Error: empty query");
    }
}
