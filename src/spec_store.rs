use crate::content_negotiator::{accumulate, Negotiation};
use crate::error::{Error, Result};
use crate::schema_merger::merge_into;
use crate::security_detector::SecurityScheme;
use crate::type_inferencer::{infer_text, SchemaFragment, SchemaType};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Swagger specification version of every produced document
pub const SWAGGER_VERSION: &str = "2.0";

/// Swagger Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API description
    pub description: String,
    /// API version
    pub version: String,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            description: "API documentation generated from observed traffic".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Complete Swagger document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    /// Swagger version
    pub swagger: String,
    /// API info
    pub info: Info,
    /// Host header of the most recent request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "basePath", default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    /// Scheme of the most recent request
    #[serde(default)]
    pub schemes: Vec<String>,
    /// API paths (template -> PathItem)
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    #[serde(rename = "securityDefinitions", default)]
    pub security_definitions: BTreeMap<String, SecurityScheme>,
}

/// Operations of one template, keyed by lowercase method
pub type PathItem = BTreeMap<String, Operation>;

/// Swagger Operation object - the observed behavior of one (template, method)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Literal path of the first request observed for the template
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
    /// Parameters, unique by (name, in)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Responses keyed by status code
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
}

/// Parameter location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
}

/// Swagger Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter location (path, query, header, body)
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Scalar type, for every location but body
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<SchemaType>,
    /// Body schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaFragment>,
    /// Whether the parameter is required
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// Swagger Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Response description
    pub description: String,
    /// Schema of the response body, absent when no body was seen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaFragment>,
}

/// Reference to a security definition, serialized as `{"<name>": []}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct SecurityRequirement {
    pub scheme: String,
}

impl From<BTreeMap<String, Vec<String>>> for SecurityRequirement {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            scheme: map.into_keys().next().unwrap_or_default(),
        }
    }
}

impl From<SecurityRequirement> for BTreeMap<String, Vec<String>> {
    fn from(requirement: SecurityRequirement) -> Self {
        BTreeMap::from([(requirement.scheme, Vec::new())])
    }
}

impl Parameter {
    /// A path, query or header parameter with its type coerced from the raw text.
    /// Path parameters are always required.
    pub fn scalar(name: &str, location: ParameterLocation, raw: &str) -> Self {
        let fragment = infer_text(raw);
        Self {
            name: name.to_string(),
            location,
            param_type: fragment.schema_type,
            schema: None,
            required: location == ParameterLocation::Path,
            example: fragment.example,
        }
    }

    /// The request body parameter. The schema is absent when the body could not
    /// be decoded.
    pub fn body(schema: Option<SchemaFragment>) -> Self {
        Self {
            name: "body".to_string(),
            location: ParameterLocation::Body,
            param_type: None,
            schema,
            required: true,
            example: None,
        }
    }

    fn merge(&mut self, incoming: Parameter) {
        if let Some(schema) = incoming.schema {
            merge_into(&mut self.schema, schema);
        }
        match self.param_type {
            None => {
                self.param_type = incoming.param_type;
                self.example = incoming.example;
            }
            Some(known) if incoming.param_type == Some(known) && self.example.is_none() => {
                self.example = incoming.example;
            }
            _ => {}
        }
    }
}

impl Operation {
    /// Create an empty operation
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            consumes: Vec::new(),
            produces: Vec::new(),
            parameters: Vec::new(),
            responses: BTreeMap::new(),
            security: Vec::new(),
        }
    }

    /// Adds a parameter, merging with the one already recorded under the same
    /// (name, in).
    pub fn record_parameter(&mut self, parameter: Parameter) {
        match self
            .parameters
            .iter_mut()
            .find(|p| p.name == parameter.name && p.location == parameter.location)
        {
            Some(known) => known.merge(parameter),
            None => self.parameters.push(parameter),
        }
    }

    /// Records a response, merging its schema into any earlier one for the status.
    pub fn record_response(&mut self, status: u16, schema: Option<SchemaFragment>) {
        let response = self
            .responses
            .entry(status.to_string())
            .or_insert_with(|| Response {
                description: status_description(status),
                schema: None,
            });
        if let Some(schema) = schema {
            merge_into(&mut response.schema, schema);
        }
    }

    /// Appends scheme references not seen before, keeping first-seen order
    pub fn record_security(&mut self, schemes: &[String]) {
        for scheme in schemes {
            if !self.security.iter().any(|r| &r.scheme == scheme) {
                self.security.push(SecurityRequirement {
                    scheme: scheme.clone(),
                });
            }
        }
    }

    pub fn record_media_types(&mut self, negotiation: &Negotiation) {
        if let Some(consumes) = &negotiation.consumes {
            accumulate(&mut self.consumes, consumes.clone());
        }
        if let Some(produces) = &negotiation.produces {
            accumulate(&mut self.produces, produces.clone());
        }
    }
}

/// Canonical reason phrase used as the response description
fn status_description(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Response")
        .to_string()
}

/// Caller-supplied transform applied to the document before it is read.
///
/// The transform always receives a fresh copy of the unpatched document, so its
/// effect never compounds across reads.
#[derive(Clone)]
pub struct Patch(Arc<dyn Fn(SpecDocument) -> anyhow::Result<SpecDocument> + Send + Sync>);

impl Patch {
    pub fn new<F>(patch: F) -> Self
    where
        F: Fn(SpecDocument) -> SpecDocument + Send + Sync + 'static,
    {
        Self(Arc::new(move |doc| Ok(patch(doc))))
    }

    pub fn fallible<F>(patch: F) -> Self
    where
        F: Fn(SpecDocument) -> anyhow::Result<SpecDocument> + Send + Sync + 'static,
    {
        Self(Arc::new(patch))
    }

    /// Runs the transform, turning both errors and panics into [`Error::Patch`]
    pub fn apply(&self, doc: SpecDocument) -> Result<SpecDocument> {
        match catch_unwind(AssertUnwindSafe(|| (self.0)(doc))) {
            Ok(Ok(patched)) => Ok(patched),
            Ok(Err(e)) => Err(Error::Patch(format!("{:#}", e))),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panicked".to_string());
                Err(Error::Patch(message))
            }
        }
    }
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Patch(..)")
    }
}

/// Key of one operation entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub template: String,
    /// Lowercase HTTP method
    pub method: String,
}

/// Document-level fields outside `paths` and `securityDefinitions`
#[derive(Debug, Clone)]
struct DocumentHeader {
    info: Info,
    host: Option<String>,
    base_path: Option<String>,
    schemes: Vec<String>,
}

/// Exclusive access to one operation entry.
///
/// Concurrent updates to the same (template, method) wait on each other while
/// other entries stay available. Dropping the guard publishes the change to
/// readers.
pub struct OperationEntry<'a> {
    entry: RefMut<'a, OperationKey, Operation>,
    revision: &'a AtomicU64,
}

impl Deref for OperationEntry<'_> {
    type Target = Operation;

    fn deref(&self) -> &Operation {
        self.entry.value()
    }
}

impl DerefMut for OperationEntry<'_> {
    fn deref_mut(&mut self) -> &mut Operation {
        self.entry.value_mut()
    }
}

impl Drop for OperationEntry<'_> {
    fn drop(&mut self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

/// The mutable specification document shared by every request task
#[derive(Debug)]
pub struct SpecStore {
    header: RwLock<DocumentHeader>,
    operations: DashMap<OperationKey, Operation>,
    security_definitions: DashMap<String, SecurityScheme>,
    /// Bumped on every change, keys the patched-document cache
    revision: AtomicU64,
    patch: Option<Patch>,
    patched: Mutex<Option<(u64, SpecDocument)>>,
    last_patch_error: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SpecStore {
    pub fn new(info: Info, base_path: Option<String>, patch: Option<Patch>) -> Self {
        debug!("Initializing SpecStore for {}", info.title);
        Self {
            header: RwLock::new(DocumentHeader {
                info,
                host: None,
                base_path,
                schemes: Vec::new(),
            }),
            operations: DashMap::new(),
            security_definitions: DashMap::new(),
            revision: AtomicU64::new(0),
            patch,
            patched: Mutex::new(None),
            last_patch_error: Mutex::new(None),
        }
    }

    /// Returns the operation for (template, method), creating it on first sight
    /// with the literal request path as its summary.
    pub fn get_or_create_operation(
        &self,
        template: &str,
        method: &str,
        request_path: &str,
    ) -> OperationEntry<'_> {
        let key = OperationKey {
            template: template.to_string(),
            method: method.to_ascii_lowercase(),
        };
        let entry = self.operations.entry(key).or_insert_with(|| {
            debug!("New operation: {} {}", method, template);
            Operation::new(request_path)
        });
        OperationEntry {
            entry,
            revision: &self.revision,
        }
    }

    /// Copy of one recorded operation
    pub fn operation(&self, template: &str, method: &str) -> Option<Operation> {
        let key = OperationKey {
            template: template.to_string(),
            method: method.to_ascii_lowercase(),
        };
        self.operations.get(&key).map(|entry| entry.value().clone())
    }

    /// Adds security definitions; existing entries are never replaced
    pub fn register_security_schemes(&self, schemes: Vec<(String, SecurityScheme)>) {
        if schemes.is_empty() {
            return;
        }
        for (name, scheme) in schemes {
            self.security_definitions.entry(name).or_insert(scheme);
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn security_definitions(&self) -> BTreeMap<String, SecurityScheme> {
        self.security_definitions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Records the host header and scheme of the latest request
    pub fn observe_host(&self, host: Option<&str>, scheme: &str) {
        let mut header = self.header.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(host) = host {
            header.host = Some(host.to_string());
        }
        header.schemes = vec![scheme.to_string()];
        drop(header);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// The document as recorded, without the patch
    pub fn snapshot(&self) -> SpecDocument {
        let header = self
            .header
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();
        for entry in self.operations.iter() {
            paths
                .entry(entry.key().template.clone())
                .or_default()
                .insert(entry.key().method.clone(), entry.value().clone());
        }

        SpecDocument {
            swagger: SWAGGER_VERSION.to_string(),
            info: header.info,
            host: header.host,
            base_path: header.base_path,
            schemes: header.schemes,
            paths,
            security_definitions: self.security_definitions(),
        }
    }

    /// Applies the configured patch to a copy of `doc`.
    ///
    /// A failing patch is isolated: the failure is logged and kept for
    /// [`SpecStore::last_patch_error`], and `doc` is returned unchanged.
    pub fn apply_patch(&self, doc: SpecDocument) -> SpecDocument {
        let Some(patch) = &self.patch else {
            return doc;
        };

        match patch.apply(doc.clone()) {
            Ok(patched) => {
                *lock(&self.last_patch_error) = None;
                patched
            }
            Err(e) => {
                error!("Serving unpatched document: {}", e);
                *lock(&self.last_patch_error) = Some(e.to_string());
                doc
            }
        }
    }

    /// The current document, patched if a patch was configured.
    ///
    /// The patch runs at most once per document revision; reads in between
    /// return the cached result.
    pub fn get_spec(&self) -> SpecDocument {
        if self.patch.is_none() {
            return self.snapshot();
        }

        let revision = self.revision.load(Ordering::Acquire);
        let mut cache = lock(&self.patched);
        if let Some((cached_revision, doc)) = cache.as_ref() {
            if *cached_revision == revision {
                return doc.clone();
            }
        }

        let doc = self.apply_patch(self.snapshot());
        *cache = Some((revision, doc.clone()));
        doc
    }

    pub fn last_patch_error(&self) -> Option<String> {
        lock(&self.last_patch_error).clone()
    }
}
