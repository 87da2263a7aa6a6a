use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use snapvault_api::{FetchFuture, Fetcher, SnapshotError};

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// HTTP endpoint returning the JSON document to snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    /// Extra query parameters (API keys, tokens, field filters).
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    pub fn from_url(url: String) -> Self {
        Self {
            url,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  HttpFetcher
// ════════════════════════════════════════════════════════════════

/// GETs `url` and parses the body as JSON.
pub struct HttpFetcher {
    http: reqwest::Client,
    url: String,
    query: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new(cfg: &SourceConfig) -> Result<Self, SnapshotError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &cfg.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SnapshotError::invalid_argument(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SnapshotError::invalid_argument(format!("header '{name}' value: {e}")))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| SnapshotError::invalid_argument(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: cfg.url.clone(),
            query: cfg.query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    async fn get(&self) -> Result<serde_json::Value, SnapshotError> {
        let resp = self
            .http
            .get(&self.url)
            .query(&self.query)
            .send()
            .await
            .map_err(|e| SnapshotError::fetch(format!("request {}: {e}", self.url)))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| SnapshotError::fetch(format!("read {}: {e}", self.url)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(SnapshotError::fetch(format!("{} returned {status}: {text}", self.url)));
        }

        serde_json::from_slice(&body)
            .map_err(|e| SnapshotError::fetch(format!("{} returned invalid JSON: {e}", self.url)))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(self.get())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use snapvault_api::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response; hands back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}/1/boards/abc"), handle)
    }

    #[tokio::test]
    async fn fetches_json_with_query_and_headers() {
        let (url, server) = serve_once("200 OK", r#"{"name":"roadmap","lists":[]}"#).await;
        let mut cfg = SourceConfig::from_url(url);
        cfg.query.insert("key".into(), "k1".into());
        cfg.headers.insert("X-Trace".into(), "abc".into());

        let fetcher = HttpFetcher::new(&cfg).unwrap();
        let payload = fetcher.fetch().await.unwrap();
        assert_eq!(payload, json!({ "name": "roadmap", "lists": [] }));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /1/boards/abc?key=k1 "), "{request}");
        assert!(request.to_ascii_lowercase().contains("x-trace: abc"), "{request}");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let (url, server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let fetcher = HttpFetcher::new(&SourceConfig::from_url(url)).unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.message.contains("503"), "{err}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_json_is_a_fetch_error() {
        let (url, server) = serve_once("200 OK", "<html>").await;
        let fetcher = HttpFetcher::new(&SourceConfig::from_url(url)).unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        server.await.unwrap();
    }

    #[test]
    fn rejects_bad_header_names() {
        let mut cfg = SourceConfig::from_url("http://localhost/".into());
        cfg.headers.insert("bad header".into(), "x".into());
        let err = HttpFetcher::new(&cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
