//! The observation pipeline.
//!
//! The [`Interceptor`] is the [`ExchangeObserver`] a host server calls once per
//! completed request. For each exchange it:
//!
//! 1. resolves the route template ([`crate::path_templater`])
//! 2. records the host header and scheme
//! 3. detects security headers ([`crate::security_detector`])
//! 4. decodes and infers request/response bodies ([`crate::payload`],
//!    [`crate::type_inferencer`])
//! 5. derives media types ([`crate::content_negotiator`])
//! 6. merges everything into the (template, method) operation of the
//!    [`SpecStore`]
//!
//! Inside a tokio runtime the pipeline runs on a spawned task so the host's
//! response path never waits on it.

use crate::content_negotiator::negotiate;
use crate::host::{header_value, Exchange, ExchangeObserver, RequestRecord, DEFAULT_BODY_LIMIT};
use crate::path_templater::{normalize, placeholders};
use crate::payload::decode_body;
use crate::security_detector::detect;
use crate::spec_store::{Parameter, ParameterLocation, SpecStore};
use crate::type_inferencer::infer;
use log::{debug, trace};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Count of observations spawned but not yet merged
#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

/// Marks one spawned observation; dropping it signals completion
struct PendingGuard(Arc<Pending>);

impl Pending {
    fn enter(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        PendingGuard(Arc::clone(self))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Drives every observed exchange into the [`SpecStore`].
#[derive(Debug, Clone)]
pub struct Interceptor {
    store: Arc<SpecStore>,
    pending: Arc<Pending>,
    body_limit: usize,
}

impl Interceptor {
    pub fn new(store: Arc<SpecStore>) -> Self {
        Self {
            store,
            pending: Arc::new(Pending::default()),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Caps the body size hosts capture for this interceptor
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn store(&self) -> &Arc<SpecStore> {
        &self.store
    }

    /// Runs the full pipeline for one exchange on the calling thread.
    ///
    /// Returns the template the exchange was recorded under, or `None` when the
    /// request matched no route and was skipped.
    pub fn observe(&self, exchange: &Exchange) -> Option<String> {
        let request = &exchange.request;
        let response = &exchange.response;

        let Some(route) = &request.route else {
            debug!("Skipping unmatched request {} {}", request.method, request.path);
            return None;
        };
        let template = normalize(&route.mount_path, &route.pattern, &route.params);

        let scheme = request
            .scheme
            .as_deref()
            .or_else(|| header_value(&request.headers, "x-forwarded-proto"))
            .unwrap_or("http");
        self.store
            .observe_host(header_value(&request.headers, "host"), scheme);

        let detection = detect(&request.headers, &self.store.security_definitions());
        self.store.register_security_schemes(detection.new_schemes);

        let has_body = request.body.as_deref().is_some_and(|body| !body.is_empty());
        let request_schema = decode_body(
            header_value(&request.headers, "content-type"),
            request.body.as_deref(),
        )
        .and_then(|payload| infer(&payload));
        // A HEAD response never carries the body a handler may have produced
        let response_body = if request.method.eq_ignore_ascii_case("HEAD") {
            None
        } else {
            response.body.as_deref()
        };
        let response_schema =
            decode_body(header_value(&response.headers, "content-type"), response_body)
                .and_then(|payload| infer(&payload));
        let negotiation = negotiate(&request.headers, &response.headers, has_body);

        let mut operation =
            self.store
                .get_or_create_operation(&template, &request.method, &request.path);

        for name in placeholders(&template) {
            if let Some(value) = route.params.get(&name) {
                let parameter = Parameter::scalar(&name, ParameterLocation::Path, value);
                operation.record_parameter(parameter);
            }
        }
        for (name, value) in &request.query {
            operation.record_parameter(Parameter::scalar(name, ParameterLocation::Query, value));
        }
        if has_body {
            operation.record_parameter(Parameter::body(request_schema));
        }
        operation.record_security(&detection.schemes);
        operation.record_media_types(&negotiation);
        operation.record_response(response.status, response_schema);
        drop(operation);

        debug!(
            "Recorded {} {} -> {} ({})",
            request.method, request.path, template, response.status
        );
        Some(template)
    }

    /// Waits until every observation spawned so far has been merged.
    pub async fn settle(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.pending.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl ExchangeObserver for Interceptor {
    fn on_request_start(&self, request: &RequestRecord) {
        trace!("Observing {} {}", request.method, request.path);
    }

    fn body_limit(&self) -> usize {
        self.body_limit
    }

    fn on_request_end(&self, exchange: Exchange) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let guard = self.pending.enter();
                let interceptor = self.clone();
                runtime.spawn(async move {
                    let _guard = guard;
                    interceptor.observe(&exchange);
                });
            }
            Err(_) => {
                self.observe(&exchange);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{RequestRecord, ResponseRecord};
    use crate::spec_store::Info;
    use crate::type_inferencer::SchemaType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn interceptor() -> Interceptor {
        Interceptor::new(Arc::new(SpecStore::new(Info::default(), None, None)))
    }

    fn exchange(request: RequestRecord, response: ResponseRecord) -> Exchange {
        Exchange { request, response }
    }

    #[test]
    fn test_plain_text_get() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("GET", "/hello").with_route("", "/hello", &[]),
            ResponseRecord::new(200)
                .with_header("content-type", "text/plain; charset=utf-8")
                .with_body("whatever"),
        ));

        let operation = interceptor.store().operation("/hello", "get").unwrap();
        assert!(operation.consumes.is_empty());
        assert_eq!(operation.produces, vec!["text/plain"]);
        assert_eq!(
            serde_json::to_value(&operation.responses["200"].schema).unwrap(),
            json!({"type": "string", "example": "whatever"})
        );
    }

    #[test]
    fn test_head_response_has_no_schema() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("HEAD", "/hello").with_route("", "/hello", &[]),
            ResponseRecord::new(200)
                .with_header("content-type", "text/plain; charset=utf-8")
                .with_body("whatever"),
        ));

        let operation = interceptor.store().operation("/hello", "head").unwrap();
        assert_eq!(operation.produces, vec!["text/plain"]);
        assert_eq!(operation.responses["200"].description, "OK");
        assert!(operation.responses["200"].schema.is_none());
    }

    #[test]
    fn test_json_post_records_body_parameter() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("POST", "/hello2")
                .with_route("", "/hello2", &[])
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"foo":"bar"}"#),
            ResponseRecord::new(200),
        ));

        let operation = interceptor.store().operation("/hello2", "post").unwrap();
        assert_eq!(operation.consumes, vec!["application/json"]);
        let body = &operation.parameters[0];
        assert_eq!(body.location, ParameterLocation::Body);
        let properties = body.schema.as_ref().unwrap().properties.as_ref().unwrap();
        assert_eq!(properties["foo"].schema_type, Some(SchemaType::String));
    }

    #[test]
    fn test_nested_route_path_parameter() {
        let interceptor = interceptor();
        let template = interceptor.observe(&exchange(
            RequestRecord::new("GET", "/api/v1/success/1/router").with_route(
                "/api/v1",
                "/success/:param/router",
                &[("param", "1")],
            ),
            ResponseRecord::new(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"result":"OK"}"#),
        ));

        assert_eq!(template.as_deref(), Some("/api/v1/success/{param}/router"));
        let operation = interceptor
            .store()
            .operation("/api/v1/success/{param}/router", "get")
            .unwrap();
        assert_eq!(
            serde_json::to_value(&operation.parameters).unwrap(),
            json!([{
                "name": "param",
                "in": "path",
                "type": "integer",
                "required": true,
                "example": 1
            }])
        );
        assert_eq!(
            serde_json::to_value(&operation.responses["200"].schema).unwrap(),
            json!({"type": "object", "properties": {"result": {"type": "string", "example": "OK"}}})
        );
    }

    #[test]
    fn test_distinct_bound_values_share_one_operation() {
        let interceptor = interceptor();
        for id in ["1", "42"] {
            interceptor.observe(&exchange(
                RequestRecord::new("GET", &format!("/items/{}", id))
                    .with_route("", "/items/:id", &[("id", id)]),
                ResponseRecord::new(200),
            ));
        }

        let doc = interceptor.store().get_spec();
        assert_eq!(doc.paths.len(), 1);
        assert_eq!(doc.paths["/items/{id}"].len(), 1);
        assert_eq!(doc.paths["/items/{id}"]["get"].summary, "/items/1");
    }

    #[test]
    fn test_security_accumulates_across_requests() {
        let interceptor = interceptor();
        let requests = [
            RequestRecord::new("GET", "/secure").with_header("Authorization", "Bearer X"),
            RequestRecord::new("GET", "/secure")
                .with_header("Authorization", "Bearer X")
                .with_header("X-Header", "Y"),
            RequestRecord::new("GET", "/secure").with_header("Authorization", "Bearer X"),
        ];
        for request in requests {
            interceptor.observe(&exchange(
                request.with_route("", "/secure", &[]),
                ResponseRecord::new(200),
            ));
        }

        let doc = interceptor.store().get_spec();
        assert_eq!(
            doc.security_definitions.keys().collect::<Vec<_>>(),
            vec!["authorization", "x-header"]
        );
        let schemes: Vec<_> = doc.paths["/secure"]["get"]
            .security
            .iter()
            .map(|r| r.scheme.as_str())
            .collect();
        assert_eq!(schemes, vec!["authorization", "x-header"]);
    }

    #[test]
    fn test_error_response_schema() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("GET", "/fail").with_route("", "/fail", &[]),
            ResponseRecord::new(500)
                .with_header("content-type", "application/json")
                .with_body(r#"{"message":"boom","code":"E_FAIL"}"#),
        ));

        let operation = interceptor.store().operation("/fail", "get").unwrap();
        let properties = operation.responses["500"]
            .schema
            .as_ref()
            .unwrap()
            .properties
            .as_ref()
            .unwrap();
        assert!(properties.contains_key("message"));
        assert!(properties.contains_key("code"));
    }

    #[test]
    fn test_malformed_json_still_records_operation() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("POST", "/broken")
                .with_route("", "/broken", &[])
                .with_header("content-type", "application/json")
                .with_body("{oops"),
            ResponseRecord::new(400),
        ));

        let operation = interceptor.store().operation("/broken", "post").unwrap();
        assert!(operation.responses.contains_key("400"));
        assert_eq!(operation.parameters.len(), 1);
        assert!(operation.parameters[0].schema.is_none());
    }

    #[test]
    fn test_query_parameters_and_host() {
        let interceptor = interceptor();
        interceptor.observe(&exchange(
            RequestRecord::new("GET", "/search")
                .with_route("", "/search", &[])
                .with_query_string("q=rust&page=2")
                .with_header("host", "localhost:8080")
                .with_header("x-forwarded-proto", "https"),
            ResponseRecord::new(200),
        ));

        let doc = interceptor.store().get_spec();
        assert_eq!(doc.host.as_deref(), Some("localhost:8080"));
        assert_eq!(doc.schemes, vec!["https"]);

        let parameters = &doc.paths["/search"]["get"].parameters;
        assert_eq!(parameters.len(), 2);
        assert!(parameters
            .iter()
            .all(|p| p.location == ParameterLocation::Query && !p.required));
        let page = parameters.iter().find(|p| p.name == "page").unwrap();
        assert_eq!(page.param_type, Some(SchemaType::Integer));
    }

    #[test]
    fn test_unmatched_request_is_skipped() {
        let interceptor = interceptor();
        let template = interceptor.observe(&exchange(
            RequestRecord::new("GET", "/nowhere"),
            ResponseRecord::new(404),
        ));

        assert!(template.is_none());
        assert!(interceptor.store().get_spec().paths.is_empty());
    }

    #[test]
    fn test_on_request_end_without_runtime_runs_inline() {
        let interceptor = interceptor();
        interceptor.on_request_end(exchange(
            RequestRecord::new("GET", "/inline").with_route("", "/inline", &[]),
            ResponseRecord::new(204),
        ));
        assert!(interceptor.store().operation("/inline", "get").is_some());
    }

    #[tokio::test]
    async fn test_on_request_end_spawns_and_settles() {
        let interceptor = interceptor();
        for _ in 0..5 {
            interceptor.on_request_end(exchange(
                RequestRecord::new("GET", "/spawned").with_route("", "/spawned", &[]),
                ResponseRecord::new(200),
            ));
        }
        interceptor.settle().await;
        assert!(interceptor.store().operation("/spawned", "get").is_some());
    }
}
