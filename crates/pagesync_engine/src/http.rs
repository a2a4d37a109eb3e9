//! HTTP adapter for [`RemoteWorkspace`].
//!
//! The actual HTTP client is abstracted behind [`HttpClient`].
//! [`ReqwestClient`] carries requests over the network and
//! [`LoopbackClient`] answers them in-process. Bodies are JSON.

use crate::error::RemoteError;
use crate::remote::{
    BlockPage, DatabasePage, PageMetadata, RemoteResult, RemoteUser, RemoteWorkspace,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pagesync_protocol::Block;
use parking_lot::Mutex;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        })
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Header pairs.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Builds a JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client abstraction.
///
/// Implement this to plug in a real HTTP library.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a request. `Err` means no response was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// [`RemoteWorkspace`] over a JSON REST API.
pub struct HttpWorkspace<C: HttpClient> {
    base_url: String,
    token: String,
    client: C,
}

impl<C: HttpClient> HttpWorkspace<C> {
    /// Creates an adapter for `base_url` authenticated with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> RemoteResult<Url> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| RemoteError::status(400, format!("invalid URL {raw}: {e}")))
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> RemoteResult<HttpResponse> {
        let request = HttpRequest {
            method,
            url: url.into(),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {}", self.token)),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body,
        };
        let response = self
            .client
            .send(request)
            .await
            .map_err(RemoteError::network)?;

        if (200..300).contains(&response.status) {
            return Ok(response);
        }
        let retry_after = response
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Err(RemoteError {
            status: Some(response.status),
            message: error_message(&response.body),
            retry_after,
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> RemoteResult<T> {
        let response = self.request(method, url, body).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| RemoteError::status(502, format!("malformed response: {e}")))
    }
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

#[async_trait]
impl<C: HttpClient> RemoteWorkspace for HttpWorkspace<C> {
    async fn current_user(&self) -> RemoteResult<RemoteUser> {
        self.request_json(Method::Get, self.endpoint("/v1/users/me")?, None)
            .await
    }

    async fn list_blocks(
        &self,
        page_id: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> RemoteResult<BlockPage> {
        let mut url = self.endpoint(&format!("/v1/blocks/{page_id}/children"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("start_cursor", cursor);
            }
        }
        self.request_json(Method::Get, url, None).await
    }

    async fn delete_block(&self, block_id: &str) -> RemoteResult<()> {
        let url = self.endpoint(&format!("/v1/blocks/{block_id}"))?;
        self.request(Method::Delete, url, None).await.map(|_| ())
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> RemoteResult<()> {
        let body = json!({ "children": blocks });
        let url = self.endpoint(&format!("/v1/blocks/{page_id}/children"))?;
        self.request(Method::Patch, url, Some(body))
            .await
            .map(|_| ())
    }

    async fn page_metadata(&self, page_id: &str) -> RemoteResult<PageMetadata> {
        let url = self.endpoint(&format!("/v1/pages/{page_id}"))?;
        self.request_json(Method::Get, url, None).await
    }

    async fn annotate_removed(&self, page_id: &str, note: &str) -> RemoteResult<()> {
        self.append_blocks(page_id, &[Block::paragraph(note)]).await
    }

    async fn query_database(
        &self,
        database_id: &str,
        edited_after: Option<DateTime<Utc>>,
        cursor: Option<&str>,
    ) -> RemoteResult<DatabasePage> {
        let mut body = json!({ "page_size": 100 });
        if let Some(after) = edited_after {
            body["filter"] = json!({
                "timestamp": "last_edited_time",
                "last_edited_time": { "after": after.to_rfc3339_opts(SecondsFormat::Millis, true) },
            });
        }
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        let url = self.endpoint(&format!("/v1/databases/{database_id}/query"))?;
        self.request_json(Method::Post, url, Some(body)).await
    }
}

/// [`HttpClient`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> RemoteResult<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pagesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::network(format!("http client setup failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Wraps an already configured client.
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = self.inner.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpWorkspace<ReqwestClient> {
    /// Creates an adapter that talks to `base_url` over the network.
    pub fn connect(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        Ok(Self::new(base_url, token, ReqwestClient::new(timeout)?))
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, String> + Send + Sync>;

/// In-process [`HttpClient`] that answers with a handler function.
///
/// Every request is recorded for later inspection.
pub struct LoopbackClient {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl LoopbackClient {
    /// Creates a client answering with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for LoopbackClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let response = (self.handler)(&request);
        self.requests.lock().push(request);
        response
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for std::sync::Arc<C> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.as_ref().send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn workspace(client: Arc<LoopbackClient>) -> HttpWorkspace<Arc<LoopbackClient>> {
        HttpWorkspace::new("https://api.example.com/", "secret", client)
    }

    #[tokio::test]
    async fn sends_bearer_token_and_parses_user() {
        let client = Arc::new(LoopbackClient::new(|_| {
            Ok(HttpResponse::json(200, &json!({"id": "u1", "name": "Ada"})))
        }));
        let ws = workspace(client.clone());

        let user = ws.current_user().await.unwrap();
        assert_eq!(user.id, "u1");

        let sent = client.requests();
        assert_eq!(sent[0].method, Method::Get);
        assert_eq!(sent[0].url, "https://api.example.com/v1/users/me");
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "authorization" && v == "Bearer secret"));
    }

    #[tokio::test]
    async fn status_and_retry_after_are_reported() {
        let client = Arc::new(LoopbackClient::new(|_| {
            Ok(HttpResponse::json(429, &json!({"message": "slow down"}))
                .with_header("Retry-After", "7"))
        }));
        let ws = workspace(client);

        let err = ws.page_metadata("p1").await.unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "slow down");
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn transport_failure_has_no_status() {
        let client = Arc::new(LoopbackClient::new(|_| Err("connection refused".into())));
        let ws = workspace(client);

        let err = ws.delete_block("b1").await.unwrap_err();
        assert_eq!(err.status, None);
        assert_eq!(err.message, "connection refused");
    }

    #[tokio::test]
    async fn list_blocks_passes_cursor() {
        let client = Arc::new(LoopbackClient::new(|_| {
            Ok(HttpResponse::json(
                200,
                &json!({"results": [{"id": "b1", "type": "paragraph", "text": "hi"}], "next_cursor": null}),
            ))
        }));
        let ws = workspace(client.clone());

        let page = ws.list_blocks("p1", Some("c2"), 50).await.unwrap();
        assert_eq!(page.results, vec![Block::with_id("b1", pagesync_protocol::BlockContent::Paragraph { text: "hi".into() })]);
        assert_eq!(
            client.requests()[0].url,
            "https://api.example.com/v1/blocks/p1/children?page_size=50&start_cursor=c2"
        );
    }

    #[tokio::test]
    async fn cursor_is_percent_encoded() {
        let client = Arc::new(LoopbackClient::new(|_| {
            Ok(HttpResponse::json(200, &json!({"results": []})))
        }));
        let ws = workspace(client.clone());

        ws.list_blocks("p1", Some("a b&c=d+e/f"), 100).await.unwrap();
        assert_eq!(
            client.requests()[0].url,
            "https://api.example.com/v1/blocks/p1/children?page_size=100&start_cursor=a+b%26c%3Dd%2Be%2Ff"
        );
    }

    #[tokio::test]
    async fn reqwest_client_round_trips_over_tcp() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let body = r#"{"id":"u9","name":"Grace"}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let ws = HttpWorkspace::connect(format!("http://{addr}"), "tok", Duration::from_secs(5))
            .unwrap();
        let user = ws.current_user().await.unwrap();
        assert_eq!(user.id, "u9");

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /v1/users/me "));
        assert!(request.contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ws = HttpWorkspace::connect(format!("http://{addr}"), "tok", Duration::from_secs(2))
            .unwrap();
        let err = ws.page_metadata("p1").await.unwrap_err();
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn database_query_filters_on_edit_time() {
        let client = Arc::new(LoopbackClient::new(|_| {
            Ok(HttpResponse::json(200, &json!({"results": []})))
        }));
        let ws = workspace(client.clone());
        let after = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        ws.query_database("db1", Some(after), None).await.unwrap();
        let body = client.requests()[0].body.clone().unwrap();
        assert_eq!(body["filter"]["last_edited_time"]["after"], "2024-01-02T03:04:05.000Z");
        assert_eq!(body["page_size"], 100);
    }
}
