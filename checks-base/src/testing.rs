//! Scripted [`HttpClient`] for exercising checks without a network

use crate::error::CheckResult;
use crate::http::HttpClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// A request observed by [`ScriptedClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// Value of the first query parameter named `name`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

type Handler = dyn Fn(&RecordedRequest) -> CheckResult<Value> + Send + Sync;

/// Answers every request through a handler closure and records it
pub struct ScriptedClient {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> CheckResult<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request made so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests whose URL ends with `suffix`
    pub fn count_requests(&self, suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    fn answer(&self, request: RecordedRequest) -> CheckResult<Value> {
        let response = (self.handler)(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        response
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        _timeout: Option<Duration>,
    ) -> CheckResult<Value> {
        self.answer(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            params: params.to_vec(),
            body: None,
        })
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        _timeout: Option<Duration>,
    ) -> CheckResult<Value> {
        self.answer(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            params: Vec::new(),
            body: Some(body.clone()),
        })
    }
}
