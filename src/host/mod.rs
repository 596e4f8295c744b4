//! Host server integration.
//!
//! A host server exposes its request lifecycle to the recorder through two small
//! traits instead of having its internals inspected:
//!
//! - [`HookHost`] is implemented by the server (or router) and installs an
//!   observer on every route it serves, nested sub-routers included.
//! - [`ExchangeObserver`] is what gets installed. The host calls
//!   [`ExchangeObserver::on_request_end`] exactly once per completed request,
//!   after the response has been finalized.
//!
//! The records passed through these hooks are plain serde types, so the same
//! exchanges can be written to and replayed from capture files.
//!
//! # Supported Hosts
//!
//! - **Axum**: See [`axum`]

pub mod axum;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest body, in bytes, a host captures by default (1 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Header map keyed by header name
pub type Headers = BTreeMap<String, String>;

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// The route a request was dispatched to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    /// Prefix the matching sub-router is mounted under (empty at top level)
    #[serde(default)]
    pub mount_path: String,
    /// Route pattern in the framework's own syntax (e.g. `/users/:id`)
    pub pattern: String,
    /// Concrete values bound to the pattern's parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Request side of an exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    /// Concrete request path, without the query string
    pub path: String,
    /// `http` or `https`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// `None` when no route matched (fallback handlers, 404s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteMatch>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: Headers,
    /// Raw body text, when it was captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Response side of an exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// One completed request/response pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

impl RequestRecord {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn with_route(mut self, mount_path: &str, pattern: &str, params: &[(&str, &str)]) -> Self {
        self.route = Some(RouteMatch {
            mount_path: mount_path.to_string(),
            pattern: pattern.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    /// Parses a raw query string (`a=1&b=two`) into the query map
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query = parse_query(query);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }
}

impl ResponseRecord {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }
}

/// Decodes a query string; a repeated key keeps its last value.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Receives request lifecycle events from a host server.
pub trait ExchangeObserver: Send + Sync {
    /// Called when a request enters a hooked route, before its handler runs.
    fn on_request_start(&self, _request: &RequestRecord) {}

    /// Largest body the host should buffer for this observer. Bodies of
    /// unknown or larger size pass through uncaptured.
    fn body_limit(&self) -> usize {
        DEFAULT_BODY_LIMIT
    }

    /// Called exactly once per completed request, after the response has been
    /// finalized. Implementations must not block the caller.
    fn on_request_end(&self, exchange: Exchange);
}

/// A server that can have an [`ExchangeObserver`] installed on its routes.
pub trait HookHost {
    /// Installs `observer` on every route reachable from this host.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NoHookPoints`] when the host has nothing
    /// an observer can be attached to.
    fn install_hooks(&mut self, observer: Arc<dyn ExchangeObserver>) -> Result<()>;
}
