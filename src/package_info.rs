//! Project metadata used to seed the document's `info` object.
//!
//! Two sources are understood, chosen by file extension:
//!
//! - `Cargo.toml`: `[package]` `name`/`description`/`version`, plus an optional
//!   `base-url` under `[package.metadata.openapi]`
//! - any `.json` file: top-level `name`/`description`/`version`/`baseUrl`

use crate::error::{Error, Result};
use crate::spec_store::Info;
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Metadata source used when none is configured
pub const DEFAULT_PACKAGE_INFO: &str = "Cargo.toml";

/// Project metadata, every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
}

#[derive(Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: Option<toml::Value>,
    description: Option<toml::Value>,
    version: Option<toml::Value>,
    metadata: Option<ManifestMetadata>,
}

#[derive(Deserialize)]
struct ManifestMetadata {
    openapi: Option<OpenApiMetadata>,
}

#[derive(Deserialize)]
struct OpenApiMetadata {
    #[serde(rename = "base-url")]
    base_url: Option<String>,
}

/// Plain string value; workspace-inherited fields (`version.workspace = true`)
/// carry no usable text
fn text(value: Option<toml::Value>) -> Option<String> {
    value.and_then(|value| value.as_str().map(str::to_string))
}

impl PackageInfo {
    /// Reads metadata from `path`, as JSON for `.json` files and as a Cargo
    /// manifest otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading package metadata from {}", path.display());
        let content = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_cargo_toml(&content)
        };

        parsed.map_err(|message| Error::PackageInfo {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Like [`PackageInfo::load`], falling back to empty metadata with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(info) => info,
            Err(e) => {
                warn!("Using default API info: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn from_cargo_toml(content: &str) -> std::result::Result<Self, String> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| e.to_string())?;
        let package = manifest
            .package
            .ok_or_else(|| "missing [package] table".to_string())?;

        Ok(Self {
            name: text(package.name),
            description: text(package.description),
            version: text(package.version),
            base_url: package
                .metadata
                .and_then(|metadata| metadata.openapi)
                .and_then(|openapi| openapi.base_url),
        })
    }

    /// Builds the Swagger `info` object, defaulting any missing field.
    ///
    /// A declared base URL is appended to the description as
    /// `", base url :" + url`.
    pub fn into_info(self) -> Info {
        let defaults = Info::default();
        let mut description = self.description.unwrap_or(defaults.description);
        if let Some(base_url) = self.base_url {
            description.push_str(", base url :");
            description.push_str(&base_url);
        }

        Info {
            title: self.name.unwrap_or(defaults.title),
            description,
            version: self.version.unwrap_or(defaults.version),
        }
    }
}
