//! The recorder context object.
//!
//! A [`SpecRecorder`] owns one [`SpecStore`] and the [`Interceptor`] feeding it.
//! It is created by [`crate::init`] or [`SpecRecorder::builder`], is cheap to
//! clone, and can be handed to request handlers (for example the docs route
//! built by [`crate::host::axum::docs_router`]).

use crate::error::{Error, Result};
use crate::host::{HookHost, DEFAULT_BODY_LIMIT};
use crate::interceptor::Interceptor;
use crate::package_info::{PackageInfo, DEFAULT_PACKAGE_INFO};
use crate::spec_store::{Patch, SpecDocument, SpecStore};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Caller customization accepted at initialization
#[derive(Debug, Clone)]
pub enum Customization {
    /// Transform applied to the document before every read
    Patch(Patch),
    /// Reserved configuration object; accepted and ignored
    Config(serde_json::Value),
}

/// Options for building a [`SpecRecorder`]
#[derive(Debug, Clone)]
pub struct RecorderBuilder {
    package_info_path: PathBuf,
    base_path: Option<String>,
    body_limit: usize,
    patch: Option<Patch>,
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self {
            package_info_path: PathBuf::from(DEFAULT_PACKAGE_INFO),
            base_path: None,
            body_limit: DEFAULT_BODY_LIMIT,
            patch: None,
        }
    }
}

impl RecorderBuilder {
    /// Metadata file seeding `info` (`Cargo.toml` or a `.json` file)
    pub fn package_info_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_info_path = path.into();
        self
    }

    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = Some(base_path.to_string());
        self
    }

    /// Largest request/response body captured, in bytes
    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn customize(mut self, customization: Customization) -> Self {
        match customization {
            Customization::Patch(patch) => self.patch = Some(patch),
            Customization::Config(config) => {
                debug!("Ignoring configuration object: {}", config);
            }
        }
        self
    }

    /// Creates a recorder that is not attached to any host.
    ///
    /// Exchanges can still be fed through [`SpecRecorder::interceptor`], which
    /// is how captured traffic is replayed.
    pub fn build(self) -> SpecRecorder {
        let info = PackageInfo::load_or_default(&self.package_info_path).into_info();
        info!("Recording API {} {}", info.title, info.version);

        let store = Arc::new(SpecStore::new(info, self.base_path, self.patch));
        let interceptor = Interceptor::new(Arc::clone(&store)).with_body_limit(self.body_limit);
        SpecRecorder { store, interceptor }
    }

    /// Creates a recorder and installs its interceptor on `host`.
    ///
    /// A host without hook points still yields a working recorder whose
    /// document stays empty.
    ///
    /// With an [`axum::Router`] host only the routes registered before this
    /// call are observed. Routes merged afterwards, [`crate::host::axum::docs_router`]
    /// included, are served but never recorded.
    pub fn init<H: HookHost>(self, host: &mut H) -> Result<SpecRecorder> {
        let recorder = self.build();
        match host.install_hooks(Arc::new(recorder.interceptor.clone())) {
            Ok(()) => debug!("Interceptor installed"),
            Err(Error::NoHookPoints(reason)) => {
                warn!("No hook points found, document will stay empty: {}", reason);
            }
            Err(e) => return Err(e),
        }
        Ok(recorder)
    }
}

/// Shared handle to one recorded document
#[derive(Debug, Clone)]
pub struct SpecRecorder {
    store: Arc<SpecStore>,
    interceptor: Interceptor,
}

impl SpecRecorder {
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::default()
    }

    /// The current document, patched if a patch was configured
    pub fn spec(&self) -> SpecDocument {
        self.store.get_spec()
    }

    /// The current document as pretty-printed JSON
    pub fn spec_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.spec())?)
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn store(&self) -> &Arc<SpecStore> {
        &self.store
    }

    /// Waits until every exchange handed over so far is reflected in the document.
    pub async fn settle(&self) {
        self.interceptor.settle().await;
    }

    pub fn last_patch_error(&self) -> Option<String> {
        self.store.last_patch_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Exchange, ExchangeObserver, RequestRecord, ResponseRecord};
    use std::fs;
    use tempfile::TempDir;

    struct Unhookable;

    impl HookHost for Unhookable {
        fn install_hooks(&mut self, _observer: Arc<dyn ExchangeObserver>) -> Result<()> {
            Err(Error::NoHookPoints("no routes".to_string()))
        }
    }

    struct Broken;

    impl HookHost for Broken {
        fn install_hooks(&mut self, _observer: Arc<dyn ExchangeObserver>) -> Result<()> {
            Err(Error::IoError(std::io::Error::other("socket closed")))
        }
    }

    #[test]
    fn test_init_without_hook_points_yields_empty_document() {
        let recorder = SpecRecorder::builder().init(&mut Unhookable).unwrap();
        let doc = recorder.spec();
        assert_eq!(doc.swagger, "2.0");
        assert!(doc.paths.is_empty());
    }

    #[test]
    fn test_init_propagates_other_host_errors() {
        assert!(SpecRecorder::builder().init(&mut Broken).is_err());
    }

    #[test]
    fn test_builder_reads_package_info() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("meta.json");
        fs::write(&path, r#"{"name": "orders", "version": "9.9.9"}"#).unwrap();

        let recorder = SpecRecorder::builder()
            .package_info_path(&path)
            .base_path("/api")
            .build();
        let doc = recorder.spec();
        assert_eq!(doc.info.title, "orders");
        assert_eq!(doc.info.version, "9.9.9");
        assert_eq!(doc.base_path.as_deref(), Some("/api"));
    }

    #[test]
    fn test_patch_customization_applies_on_read() {
        let recorder = SpecRecorder::builder()
            .customize(Customization::Patch(Patch::new(|mut doc| {
                doc.info.title = "Patched".to_string();
                doc
            })))
            .customize(Customization::Config(serde_json::json!({"ignored": true})))
            .build();

        recorder.interceptor().observe(&Exchange {
            request: RequestRecord::new("GET", "/ping").with_route("", "/ping", &[]),
            response: ResponseRecord::new(200),
        });

        assert_eq!(recorder.spec().info.title, "Patched");
        assert!(recorder.spec_json().unwrap().contains("\"/ping\""));
        assert!(recorder.last_patch_error().is_none());
    }
}
