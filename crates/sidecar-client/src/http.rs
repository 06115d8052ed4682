//! Shared REST plumbing for the registry and controller clients
//!
//! Handles base URL normalization, bearer authentication, and translation of
//! transport failures and HTTP status codes into `ClientError`.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use sidecar_api::{ClientError, Result};
use tracing::debug;

/// Header carrying the server-side request ID of a failed call
pub const REQUEST_ID_HEADER: &str = "Sd-Request-Id";

/// Configuration for a REST client
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Base URL of the server, e.g. `http://registry:8080`
    pub url: String,
    /// Bearer token; no authentication header is sent when empty
    pub token: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            token: String::new(),
            timeout_ms: 30000,
        }
    }
}

impl HttpClientConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validates the base URL and strips any trailing slash
    pub fn normalize(mut self) -> Result<Self> {
        self.url = self.url.trim_end_matches('/').to_string();

        let parsed = url::Url::parse(&self.url).map_err(|e| {
            ClientError::InvalidConfiguration(format!("cannot parse server URL {}: {}", self.url, e))
        })?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ClientError::InvalidConfiguration(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        Ok(self)
    }
}

/// Thin wrapper around `reqwest::Client` bound to one server
#[derive(Clone, Debug)]
pub(crate) struct RestClient {
    client: Client,
    config: HttpClientConfig,
}

impl RestClient {
    pub(crate) fn new(config: HttpClientConfig) -> Result<Self> {
        let config = config.normalize()?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InvalidConfiguration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.config.url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.url, path);
        let builder = self.client.request(method, url);

        if self.config.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.token)
        }
    }

    /// Sends the request and accepts only the listed status codes
    pub(crate) async fn send(
        &self,
        builder: RequestBuilder,
        expected: &[StatusCode],
    ) -> Result<Response> {
        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if expected.contains(&status) {
            return Ok(response);
        }

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        debug!(
            status = status.as_u16(),
            request_id = request_id.as_deref().unwrap_or(""),
            "Unexpected response status"
        );

        Err(map_status(status, request_id.as_deref(), body))
    }
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Connection(err.to_string())
    }
}

/// Maps a non-success status to the client error taxonomy.
///
/// Responses carrying a request ID come from the server itself, so their JSON
/// `error` field is used as the message and a 404 is a real "not found"
/// rather than a missing route behind a gateway.
pub(crate) fn map_status(status: StatusCode, request_id: Option<&str>, body: String) -> ClientError {
    let message = match request_id {
        Some(_) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("Error"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body),
        None => body,
    };

    match status {
        StatusCode::GONE => ClientError::UnknownInstance(message),
        StatusCode::NOT_FOUND if request_id.is_none() => ClientError::ServiceUnavailable(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            ClientError::ServiceUnavailable(message)
        }
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        _ => ClientError::ServerError {
            code: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_trailing_slash() {
        let config = HttpClientConfig::new("http://registry:8080/").normalize().unwrap();
        assert_eq!(config.url, "http://registry:8080");
    }

    #[test]
    fn test_normalize_rejects_bad_urls() {
        let err = HttpClientConfig::new("ftp://registry").normalize().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration(_)));

        let err = HttpClientConfig::new("not a url").normalize().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_map_status() {
        assert!(map_status(StatusCode::GONE, None, String::new()).is_unknown_instance());
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, None, String::new()),
            ClientError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, Some("req-1"), String::new()),
            ClientError::ServerError { code: 404, .. }
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, None, String::new()),
            ClientError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, None, String::new()),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, None, String::new()),
            ClientError::ServerError { code: 500, .. }
        ));
    }

    #[test]
    fn test_map_status_uses_server_message() {
        let err = map_status(
            StatusCode::GONE,
            Some("req-7"),
            r#"{"error":"instance expired"}"#.to_string(),
        );
        assert_eq!(err.to_string(), "unknown instance: instance expired");

        let err = map_status(StatusCode::GONE, None, "plain body".to_string());
        assert_eq!(err.to_string(), "unknown instance: plain body");
    }
}
