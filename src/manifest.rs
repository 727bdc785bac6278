//! Manifest handling for clib.json and package.json
//!
//! A project (or a published package) describes itself in a JSON manifest. The
//! first existing file from [`MANIFEST_NAMES`] wins.
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::Manifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(manifest) = Manifest::load(".")? {
//!     for (name, version) in &manifest.dependencies {
//!         println!("{} {}", name, version);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest filenames, in lookup order
pub const MANIFEST_NAMES: &[&str] = &["clib.json", "package.json"];

/// Project or package manifest (clib.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Repository slug (`owner/name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Source files copied into `deps/<name>/` on install
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,

    /// Runtime dependencies (slug -> version)
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Development dependencies (slug -> version)
    #[serde(default)]
    pub development: BTreeMap<String, String>,

    /// Additional registry endpoints, searched before the configured ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registries: Vec<String>,

    /// Install prefix exported as `PREFIX` to install commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Shell command run after the package files are in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
}

impl Manifest {
    /// Create a new empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the first manifest candidate found in `dir`
    ///
    /// Returns `Ok(None)` when no candidate exists. A candidate that exists but
    /// does not parse is an error.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        match Self::find(dir) {
            Some(path) => Self::load_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// Path of the first manifest candidate that exists in `dir`
    pub fn find<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
        MANIFEST_NAMES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|path| path.is_file())
    }

    /// Load a manifest from an explicit file path
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read(path)?;
        Self::from_slice(&content, &path.display().to_string())
    }

    /// Parse manifest bytes; `origin` names the source in error messages
    pub fn from_slice(bytes: &[u8], origin: &str) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ManifestParse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check whether any manifest candidate exists in `dir`
    pub fn exists<P: AsRef<Path>>(dir: P) -> bool {
        Self::find(dir).is_some()
    }
}
