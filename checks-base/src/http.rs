//! HTTP access to polled APIs
//!
//! Checks talk to their target through the [`HttpClient`] trait so the
//! collection logic can be exercised without a network. [`ReqwestClient`]
//! is the production implementation.

use crate::error::{CheckError, CheckResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Minimal HTTP surface a check needs
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` with query `params`, decoding the body as JSON.
    ///
    /// Bodies that are not JSON are returned as `Value::String`.
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> CheckResult<Value>;

    /// POST a JSON `body` to `url`
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> CheckResult<Value>;
}

/// Connection settings for [`ReqwestClient`]
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Default timeout applied to every request
    pub timeout: Duration,
    /// Verify TLS certificates
    pub ssl_verify: bool,
    /// Static headers sent with every request (e.g. `X-Auth-Token`)
    pub headers: HashMap<String, String>,
    /// Basic auth credentials
    pub basic_auth: Option<(String, String)>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            ssl_verify: true,
            headers: HashMap::new(),
            basic_auth: None,
        }
    }
}

impl HttpSettings {
    fn header_map(&self) -> CheckResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| CheckError::configuration(format!("Invalid header '{key}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                CheckError::configuration(format!("Invalid value for header '{key}': {e}"))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// `reqwest`-backed [`HttpClient`]
pub struct ReqwestClient {
    client: Client,
    settings: HttpSettings,
}

impl ReqwestClient {
    pub fn new(settings: HttpSettings) -> CheckResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .default_headers(settings.header_map()?)
            .build()
            .map_err(|e| CheckError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    async fn send(
        &self,
        url: &str,
        mut request: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> CheckResult<Value> {
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some((user, password)) = &self.settings.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CheckError::transport(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::http(url, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CheckError::transport(url, e.to_string()))?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "response received");

        Ok(decode_body(body))
    }
}

/// Decode a response body as JSON, falling back to the raw text
pub fn decode_body(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> CheckResult<Value> {
        let request = self.client.get(url).query(params);
        self.send(url, request, timeout).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> CheckResult<Value> {
        let request = self.client.post(url).json(body);
        self.send(url, request, timeout).await
    }
}
