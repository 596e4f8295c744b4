//! openapi-from-traffic - Swagger 2.0 documentation derived from observed HTTP traffic.
//!
//! Instead of reading handler source code, this library watches the requests a
//! running server actually handles and incrementally builds an API description
//! from them: route templates, parameter and body schemas, response schemas per
//! status code, header-based security schemes and media types.
//!
//! # Architecture
//!
//! 1. [`host`] - Hook interface a server exposes, with an Axum adapter
//! 2. [`interceptor`] - Drives every completed exchange through the pipeline
//! 3. [`path_templater`] - Maps matched routes to stable `{param}` templates
//! 4. [`payload`] - Decodes bodies by Content-Type
//! 5. [`type_inferencer`] - Infers schema fragments from decoded values
//! 6. [`schema_merger`] - Folds repeated observations together
//! 7. [`security_detector`] - Classifies security headers
//! 8. [`content_negotiator`] - Derives consumed/produced media types
//! 9. [`spec_store`] - The shared, concurrently updated document
//! 10. [`recorder`] - The context object tying it together
//!
//! Captured traffic can also be replayed offline, see [`capture`], [`scanner`]
//! and the [`cli`] module.
//!
//! # Example Usage
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use openapi_from_traffic::host::axum::docs_router;
//!
//! # async fn run() -> openapi_from_traffic::error::Result<()> {
//! let mut app = Router::new().route("/users/{id}", get(|| async { "{}" }));
//! let recorder = openapi_from_traffic::init(&mut app, None)?;
//!
//! // Routes merged after init are served but not recorded
//! let app = app.merge(docs_router(recorder.clone()));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod cli;
pub mod content_negotiator;
pub mod error;
pub mod host;
pub mod interceptor;
pub mod package_info;
pub mod path_templater;
pub mod payload;
pub mod recorder;
pub mod scanner;
pub mod schema_merger;
pub mod security_detector;
pub mod serializer;
pub mod spec_store;
pub mod type_inferencer;

use host::HookHost;
use recorder::{Customization, SpecRecorder};

/// Creates a recorder with default options and installs it on `host`.
///
/// `customization` may supply a document patch; see [`recorder::Customization`].
/// Use [`SpecRecorder::builder`] for further options.
///
/// With the axum adapter only routes present on the router at this point are
/// observed. Routes merged afterwards are served but never recorded.
pub fn init<H: HookHost>(
    host: &mut H,
    customization: Option<Customization>,
) -> error::Result<SpecRecorder> {
    let mut builder = SpecRecorder::builder();
    if let Some(customization) = customization {
        builder = builder.customize(customization);
    }
    builder.init(host)
}
