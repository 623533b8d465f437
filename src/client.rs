use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS};
use crate::sse::ByteStream;
use crate::types::Conversation;

/// Environment variable consulted when no agent URL is given.
pub const AGENT_URL_ENV: &str = "CODECIRCLE_AGENT_URL";

/// Agent URL used when neither the caller nor the environment names one.
pub const DEFAULT_AGENT_URL: &str = "http://localhost:8100";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The operations the chat core needs from the agent backend.
///
/// [`AgentClient`] implements this over HTTP; tests substitute an in-memory
/// backend.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Create an empty conversation owned by `org_id`.
    async fn create_conversation(&self, org_id: &str) -> Result<Conversation>;

    /// List the conversations owned by `org_id`, most recent first.
    async fn list_conversations(&self, org_id: &str) -> Result<Vec<Conversation>>;

    /// Fetch one conversation with its full message history.
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation>;

    /// Delete a conversation and its messages.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Send a user message and return the agent's streamed response body.
    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<ByteStream>;
}

/// HTTP client for the debugging agent's conversation API.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: ReqwestClient,
    base_url: Url,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl AgentClient {
    /// Create a new agent client.
    ///
    /// The base URL can be provided directly or read from the
    /// CODECIRCLE_AGENT_URL environment variable; it defaults to a local agent.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        request_timeout: Option<Duration>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var(AGENT_URL_ENV).unwrap_or_else(|_| DEFAULT_AGENT_URL.to_string()),
        };
        let base_url = Url::parse(&base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::url(
                format!("Agent URL cannot be used as a base: {base_url}"),
                None,
            ));
        }

        let request_timeout = request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .default_headers(Self::default_headers())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
            connect_timeout,
        })
    }

    /// The agent's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Builds `{base}/api/v1/<segments>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::url(
                    format!("Agent URL cannot be used as a base: {}", self.base_url),
                    None,
                )
            })?;
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        Ok(url)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        match response.text().await {
            Ok(body) => error_from_body(status_code, &body),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            ),
        }
    }

    fn map_request_error(&self, e: reqwest::Error, timeout: Duration) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(
                format!("Cannot reach the agent at {}: {e}", self.base_url),
                Some(Box::new(e)),
            )
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Sends `request` and returns the response if its status is a success.
    async fn execute(&self, request: RequestBuilder, timeout: Duration) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = request.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        let response = result.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            self.map_request_error(e, timeout)
        })?;
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = request.timeout(self.request_timeout);
        let response = self.execute(request, self.request_timeout).await?;
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait]
impl ConversationBackend for AgentClient {
    async fn create_conversation(&self, org_id: &str) -> Result<Conversation> {
        let url = self.endpoint(&["organizations", org_id, "conversations"])?;
        let request = self.client.post(url).json(&serde_json::json!({}));
        self.execute_json(request).await
    }

    async fn list_conversations(&self, org_id: &str) -> Result<Vec<Conversation>> {
        let url = self.endpoint(&["organizations", org_id, "conversations"])?;
        self.execute_json(self.client.get(url)).await
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let url = self.endpoint(&["conversations", conversation_id])?;
        self.execute_json(self.client.get(url))
            .await
            .map_err(|err| match err {
                Error::NotFound { message, .. } => Error::not_found(
                    message,
                    Some("conversation".to_string()),
                    Some(conversation_id.to_string()),
                ),
                err => err,
            })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", conversation_id])?;
        let request = self.client.delete(url).timeout(self.request_timeout);
        self.execute(request, self.request_timeout).await?;
        Ok(())
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<ByteStream> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        // No request timeout: the response streams for as long as the agent works.
        let request = self
            .client
            .post(url)
            .header(header::ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(&serde_json::json!({ "content": content }));
        let response = self.execute(request, self.connect_timeout).await?;
        let bytes = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });
        Ok(Box::pin(bytes))
    }
}

/// Maps a non-success status and its body to an error.
///
/// The message comes from a `detail` field, an `error.message` field, or the
/// raw body, in that order.
fn error_from_body(status_code: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        detail: Option<serde_json::Value>,
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let detail = parsed.as_ref().and_then(|e| match &e.detail {
        Some(serde_json::Value::String(detail)) => Some(detail.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    });
    let message = detail
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|e| e.error.as_ref())
                .and_then(|e| e.message.clone())
        })
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(message),
        404 => Error::not_found(message, None, None),
        408 => Error::timeout(message, None),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message),
        _ => Error::api(status_code, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = AgentClient::new(Some("http://agent.internal:8100".to_string())).unwrap();
        assert_eq!(client.base_url().as_str(), "http://agent.internal:8100/");
        assert_eq!(client.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(client.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        let client = AgentClient::with_options(
            Some("http://agent.internal/prefix".to_string()),
            Some(Duration::from_secs(30)),
            Some(Duration::from_secs(1)),
        )
        .unwrap();
        assert_eq!(client.request_timeout, Duration::from_secs(30));
        assert_eq!(client.connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn invalid_base_url() {
        let err = AgentClient::new(Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
        let err = AgentClient::new(Some("mailto:ops@example.com".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn endpoints_are_joined_under_api_v1() {
        let client = AgentClient::new(Some("http://agent:8100".to_string())).unwrap();
        assert_eq!(
            client
                .endpoint(&["organizations", "org-1", "conversations"])
                .unwrap()
                .as_str(),
            "http://agent:8100/api/v1/organizations/org-1/conversations"
        );

        let client = AgentClient::new(Some("http://agent:8100/codecircle/".to_string())).unwrap();
        assert_eq!(
            client
                .endpoint(&["conversations", "a b", "messages"])
                .unwrap()
                .as_str(),
            "http://agent:8100/codecircle/api/v1/conversations/a%20b/messages"
        );
    }

    #[test]
    fn error_bodies_map_to_typed_errors() {
        let err = error_from_body(404, r#"{"detail":"Conversation not found"}"#);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Conversation not found"));

        let err = error_from_body(500, r#"{"error":{"message":"agent crashed"}}"#);
        assert!(matches!(err, Error::InternalServer { ref message } if message == "agent crashed"));

        let err = error_from_body(503, "upstream unavailable");
        assert!(matches!(err, Error::ServiceUnavailable { ref message } if message == "upstream unavailable"));

        let err = error_from_body(422, r#"{"detail":[{"msg":"field required"}]}"#);
        assert_eq!(err.status_code(), Some(422));
        assert!(err.to_string().contains("field required"));

        assert!(error_from_body(408, "").is_timeout());
        assert!(matches!(error_from_body(400, "bad"), Error::BadRequest { .. }));
    }
}
