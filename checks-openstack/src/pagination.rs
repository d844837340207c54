//! Marker-based pagination over OpenStack collection endpoints
//!
//! A collection response looks like
//! `{"servers": [...], "servers_links": [{"rel": "next", "href": "..."}]}`.
//! [`fetch_all`] follows `next` links by re-issuing the request with
//! `marker=<id of the last item>` until the server stops advertising a next
//! page or the optional item budget is spent.

use agent_checks_base::{CheckError, CheckResult, HttpClient};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::InventoryItem;

/// Items that can act as a pagination marker
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for InventoryItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A collection endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    /// Key holding the items in the response body
    pub collection: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection: collection.into(),
        }
    }

    fn links_key(&self) -> String {
        format!("{}_links", self.collection)
    }
}

/// One page of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation link, when the server has more
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

impl<T: DeserializeOwned> Page<T> {
    /// Validate a response body against the endpoint's collection layout
    pub fn from_value(mut body: Value, endpoint: &Endpoint) -> CheckResult<Self> {
        let kind = type_name(&body);
        let object = body.as_object_mut().ok_or_else(|| {
            CheckError::invalid_response(format!(
                "expected an object from '{}', got {kind}",
                endpoint.url
            ))
        })?;

        let items = match object.remove(&endpoint.collection) {
            Some(items) => serde_json::from_value(items).map_err(|e| {
                CheckError::invalid_response(format!(
                    "malformed '{}' collection from '{}': {e}",
                    endpoint.collection, endpoint.url
                ))
            })?,
            None => {
                return Err(CheckError::invalid_response(format!(
                    "response from '{}' has no '{}' key",
                    endpoint.url, endpoint.collection
                )));
            }
        };

        let next = match object.remove(&endpoint.links_key()) {
            Some(links) => serde_json::from_value::<Vec<Link>>(links)
                .map_err(|e| {
                    CheckError::invalid_response(format!("malformed pagination links: {e}"))
                })?
                .into_iter()
                .find(|l| l.rel == "next")
                .map(|l| l.href),
            None => None,
        };

        Ok(Self { items, next })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything collected by one pagination sweep
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBatch<T> {
    pub items: Vec<T>,
    /// The item budget stopped the sweep while more pages were advertised
    pub truncated: bool,
    /// Number of requests issued
    pub requests: usize,
}

/// Fetch every page of `endpoint`.
///
/// `params` are sent with every request; a `limit` entry sets the page size.
/// With `page_limit` set, the sweep stops once that many items have been
/// accumulated and never returns more. Any error aborts the sweep and no
/// partial batch is returned.
pub async fn fetch_all<T>(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    params: &[(String, String)],
    page_limit: Option<usize>,
    timeout: Option<Duration>,
) -> CheckResult<FetchedBatch<T>>
where
    T: DeserializeOwned + Identified,
{
    let mut items: Vec<T> = Vec::new();
    let mut marker: Option<String> = None;
    let mut requests = 0;
    let mut truncated = false;

    loop {
        let mut query = params.to_vec();
        if let Some(marker) = &marker {
            query.retain(|(k, _)| k != "marker");
            query.push(("marker".to_string(), marker.clone()));
        }

        let body = client.get(&endpoint.url, &query, timeout).await?;
        requests += 1;
        let page = Page::<T>::from_value(body, endpoint)?;
        debug!(
            url = %endpoint.url,
            page = requests,
            items = page.items.len(),
            has_next = page.next.is_some(),
            "fetched page"
        );

        let has_next = page.next.is_some();
        items.extend(page.items);

        if let Some(limit) = page_limit {
            if items.len() >= limit {
                truncated = has_next || items.len() > limit;
                items.truncate(limit);
                break;
            }
        }
        if !has_next {
            break;
        }

        let next_marker = match items.last() {
            Some(last) => last.id().to_string(),
            None => break,
        };
        if marker.as_deref() == Some(next_marker.as_str()) {
            warn!(
                url = %endpoint.url,
                marker = %next_marker,
                "pagination marker did not advance, stopping"
            );
            break;
        }
        marker = Some(next_marker);
    }

    Ok(FetchedBatch {
        items,
        truncated,
        requests,
    })
}
