//! # Axum Host
//!
//! Hooks an [`axum::Router`] with a route layer over every route it holds,
//! nested routers included. Fallbacks (404, 405) are not wrapped, and routes
//! added after the hooks are installed are not observed, which is how
//! [`docs_router`] keeps the docs endpoint out of the generated document.
//!
//! For each request the middleware captures the matched route pattern, the
//! bound path parameters, headers and the query string. Both bodies stream
//! through a `TeeBody` which forwards every frame unchanged and keeps a copy
//! of at most the observer's body limit. The exchange reaches the observer
//! once the response body has ended, failed or been dropped.

use super::{
    parse_query, Exchange, ExchangeObserver, Headers, HookHost, RequestRecord, ResponseRecord,
    RouteMatch,
};
use crate::error::{Error, Result};
use crate::recorder::SpecRecorder;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, MatchedPath, OriginalUri, RawPathParams, Request, State};
use axum::http::{header, request, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http_body::{Body as HttpBody, Frame, SizeHint};
use log::{debug, error};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

/// Path the generated document is served on
pub const DOCS_PATH: &str = "/api-docs";

impl HookHost for Router {
    fn install_hooks(&mut self, observer: Arc<dyn ExchangeObserver>) -> Result<()> {
        if !self.has_routes() {
            return Err(Error::NoHookPoints("axum router without routes".to_string()));
        }
        let router = std::mem::replace(self, Router::new());
        *self = router.route_layer(middleware::from_fn_with_state(observer, observe_exchange));
        Ok(())
    }
}

/// Router serving the recorder's current document as JSON on [`DOCS_PATH`].
///
/// Merge it into the application after the recorder is initialized.
pub fn docs_router(recorder: SpecRecorder) -> Router {
    Router::new()
        .route(DOCS_PATH, get(serve_docs))
        .with_state(recorder)
}

async fn serve_docs(State(recorder): State<SpecRecorder>) -> Response {
    match recorder.spec_json() {
        Ok(json) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => {
            error!("Failed to render API docs: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn observe_exchange(
    State(observer): State<Arc<dyn ExchangeObserver>>,
    request: Request,
    next: Next,
) -> Response {
    let limit = observer.body_limit();
    let (mut parts, body) = request.into_parts();

    let record = RequestRecord {
        method: parts.method.to_string(),
        path: parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        scheme: parts.uri.scheme_str().map(str::to_string),
        route: route_match(&mut parts).await,
        query: parts.uri.query().map(parse_query).unwrap_or_default(),
        headers: capture_headers(&parts.headers),
        body: None,
    };
    observer.on_request_start(&record);

    // HEAD responses never carry the body the handler produced
    let response_limit = if parts.method == Method::HEAD { 0 } else { limit };

    let request_capture = Arc::new(Mutex::new(Capture::new(limit)));
    let body = Body::new(TeeBody::new(body, Arc::clone(&request_capture), None));
    let response = next.run(Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    let pending = PendingExchange {
        observer,
        request: record,
        request_capture,
        response: ResponseRecord {
            status: parts.status.as_u16(),
            headers: capture_headers(&parts.headers),
            body: None,
        },
    };
    let response_capture = Arc::new(Mutex::new(Capture::new(response_limit)));
    let body = Body::new(TeeBody::new(body, response_capture, Some(pending)));

    Response::from_parts(parts, body)
}

/// Matched pattern and bound values, `None` for requests no route matched
async fn route_match(parts: &mut request::Parts) -> Option<RouteMatch> {
    let pattern = parts.extensions.get::<MatchedPath>()?.as_str().to_string();
    let params = match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        Err(_) => Default::default(),
    };

    Some(RouteMatch {
        // MatchedPath already carries the nest prefix
        mount_path: String::new(),
        pattern,
        params,
    })
}

fn capture_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Copy of a body as it streams past
#[derive(Debug)]
struct Capture {
    limit: usize,
    bytes: Vec<u8>,
    overflowed: bool,
    /// `Some(true)` once the body reached its end, `Some(false)` if it failed
    /// or was dropped early
    finished: Option<bool>,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: Vec::new(),
            overflowed: false,
            finished: None,
        }
    }

    fn record(&mut self, data: &[u8]) {
        if self.overflowed || self.finished.is_some() {
            return;
        }
        if self.bytes.len() + data.len() > self.limit {
            self.overflowed = true;
            self.bytes = Vec::new();
        } else {
            self.bytes.extend_from_slice(data);
        }
    }

    fn finish(&mut self, complete: bool) {
        if self.finished.is_none() {
            self.finished = Some(complete);
        }
    }

    /// The body text, if the whole body was seen, fit the limit and is UTF-8
    fn text(&self) -> Option<String> {
        if self.finished != Some(true) || self.overflowed || self.bytes.is_empty() {
            return None;
        }
        match String::from_utf8(self.bytes.clone()) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("Not recording non UTF-8 body: {}", e);
                None
            }
        }
    }
}

fn lock(capture: &Mutex<Capture>) -> MutexGuard<'_, Capture> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything known about an exchange except the response body
struct PendingExchange {
    observer: Arc<dyn ExchangeObserver>,
    request: RequestRecord,
    request_capture: Arc<Mutex<Capture>>,
    response: ResponseRecord,
}

impl PendingExchange {
    fn emit(self, response_body: Option<String>) {
        let PendingExchange {
            observer,
            mut request,
            request_capture,
            mut response,
        } = self;
        request.body = lock(&request_capture).text();
        response.body = response_body;
        observer.on_request_end(Exchange { request, response });
    }
}

/// Pass-through body copying frames into a shared [`Capture`].
///
/// Frames and errors reach the consumer untouched. When `exchange` is set it
/// is emitted exactly once, as soon as the body ends, errors or is dropped.
struct TeeBody {
    inner: Body,
    capture: Arc<Mutex<Capture>>,
    exchange: Option<PendingExchange>,
}

impl TeeBody {
    fn new(inner: Body, capture: Arc<Mutex<Capture>>, exchange: Option<PendingExchange>) -> Self {
        Self {
            inner,
            capture,
            exchange,
        }
    }

    fn finish(&mut self, complete: bool) {
        let body = {
            let mut capture = lock(&self.capture);
            capture.finish(complete);
            capture.text()
        };
        if let Some(pending) = self.exchange.take() {
            pending.emit(body);
        }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Bytes>, axum::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    lock(&this.capture).record(data);
                }
                // The consumer may stop polling once the body reports its end
                if this.inner.is_end_stream() {
                    this.finish(true);
                }
            }
            Poll::Ready(Some(Err(e))) => {
                debug!("Body failed mid-stream: {}", e);
                this.finish(false);
            }
            Poll::Ready(None) => this.finish(true),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        let ended = self.inner.is_end_stream();
        self.finish(ended);
    }
}
