//! Record installed packages back into the project manifest
//!
//! `--save` and `--save-dev` add the installed package to the `dependencies` or
//! `development` section of the project's clib.json (or package.json). Only the
//! targeted key changes: other sections and unrelated top-level keys keep their
//! content and order.

use crate::manifest::MANIFEST_NAMES;
use crate::package::PackageIdentifier;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest section a dependency is recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dependencies,
    Development,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Section::Dependencies => "dependencies",
            Section::Development => "development",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

pub struct ManifestWriter {
    project_dir: PathBuf,
}

impl ManifestWriter {
    pub fn new<P: AsRef<Path>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Set `id -> version` in `section` of the first manifest that accepts the write
    ///
    /// Returns the path that was written.
    pub fn record(
        &self,
        id: &PackageIdentifier,
        version: &str,
        section: Section,
    ) -> Result<PathBuf> {
        tracing::debug!(package = %id, version, section = %section, "saving dependency");

        for name in MANIFEST_NAMES {
            let path = self.project_dir.join(name);
            match write_dependency(&path, id, version, section) {
                Ok(()) => return Ok(path),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "manifest candidate rejected");
                }
            }
        }

        Err(Error::ManifestWriteFailed(format!("{}@{}", id, version)))
    }
}

fn write_dependency(
    path: &Path,
    id: &PackageIdentifier,
    version: &str,
    section: Section,
) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let mut document: Value = serde_json::from_str(&content)?;

    let root = document.as_object_mut().ok_or_else(|| Error::ManifestParse {
        path: path.display().to_string(),
        reason: "top-level value is not an object".to_string(),
    })?;

    // Create the section if missing; a non-object section is replaced
    let entry = root
        .entry(section.key())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }

    if let Some(deps) = entry.as_object_mut() {
        deps.insert(id.to_string(), Value::String(version.to_string()));
    }

    let mut serialized = serde_json::to_string_pretty(&document)?;
    serialized.push('\n');
    fs::write(path, serialized)?;
    Ok(())
}
