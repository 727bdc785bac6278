//! Package identifiers, slugs and resolved package descriptors
//!
//! A slug names a package the way users type it on the command line or in a
//! manifest's dependency table:
//!
//! - `name` (owner defaults to [`DEFAULT_OWNER`])
//! - `owner/name`
//! - `owner/name@version`
//! - `https://github.com/owner/name`
//!
//! # Examples
//!
//! ```
//! use clib_install::{PackageIdentifier, PackageSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = PackageSpec::parse("stephenmathieson/trim.c@0.0.2")?;
//! assert_eq!(spec.id.owner(), "stephenmathieson");
//! assert_eq!(spec.id.name(), "trim.c");
//! assert_eq!(spec.version, "0.0.2");
//!
//! // Owner defaults when omitted
//! let id: PackageIdentifier = "list".parse()?;
//! assert_eq!(id.to_string(), "clibs/list");
//! # Ok(())
//! # }
//! ```

use crate::manifest::Manifest;
use crate::registry::DownloadReference;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Owner assumed when a slug has no `owner/` part
pub const DEFAULT_OWNER: &str = "clibs";

/// Ref installed when a slug or dependency does not pin one
pub const DEFAULT_VERSION: &str = "master";

/// Identity of a package: `(owner, name)`
///
/// Two identifiers are equal when owner and name match, regardless of how the
/// slug was spelled (`list`, `clibs/list`, `clibs/list@1.0.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentifier {
    owner: String,
    name: String,
}

impl PackageIdentifier {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse the identifier part of a slug, ignoring any `@version` suffix
    pub fn parse(slug: &str) -> Result<Self> {
        PackageSpec::parse(slug).map(|spec| spec.id)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for PackageIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A package identifier together with the version (git ref) to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub id: PackageIdentifier,
    pub version: String,
}

impl PackageSpec {
    /// Parse a slug of the form `[owner/]name[@version]`
    pub fn parse(slug: &str) -> Result<Self> {
        let trimmed = slug.trim();
        let without_host = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("github:"))
            .unwrap_or(trimmed);

        let (path, version) = match without_host.rsplit_once('@') {
            Some((path, version)) => (path, Some(version)),
            None => (without_host, None),
        };
        let path = path.trim_end_matches(".git");

        let (owner, name) = match path.split_once('/') {
            Some((owner, name)) => (owner, name),
            None => (DEFAULT_OWNER, path),
        };

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(Error::InvalidSlug(slug.to_string()));
        }

        Ok(Self {
            id: PackageIdentifier::new(owner, name),
            version: normalize_version(version),
        })
    }

    /// Build a spec from a manifest dependency entry (`"owner/name": "version"`)
    pub fn from_dependency(name: &str, version: &str) -> Result<Self> {
        let mut spec = Self::parse(name)?;
        spec.version = normalize_version(Some(version));
        Ok(spec)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

fn normalize_version(version: Option<&str>) -> String {
    match version.map(str::trim) {
        None | Some("") | Some("*") | Some("latest") => DEFAULT_VERSION.to_string(),
        Some(v) => v.to_string(),
    }
}

/// A package resolved against a registry, with its manifest fetched
///
/// Descriptors are built once per install step and never mutated.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub id: PackageIdentifier,
    /// Directory name under the output directory
    pub name: String,
    /// Ref the package is fetched at
    pub version: String,
    /// Version the package manifest declares, if any
    pub declared_version: Option<String>,
    pub reference: DownloadReference,
    /// Candidate filename the manifest was found under (`clib.json` or `package.json`)
    pub manifest_name: String,
    /// Manifest exactly as fetched, copied into the installed package
    pub manifest_bytes: Vec<u8>,
    pub src: Vec<String>,
    pub dependencies: BTreeMap<String, String>,
    pub development: BTreeMap<String, String>,
    pub prefix: Option<String>,
    pub install: Option<String>,
}

impl PackageDescriptor {
    /// Build a descriptor from a fetched package manifest
    pub fn from_manifest(
        spec: &PackageSpec,
        reference: DownloadReference,
        manifest_name: &str,
        manifest_bytes: Vec<u8>,
    ) -> Result<Self> {
        let manifest = Manifest::from_slice(&manifest_bytes, manifest_name)?;

        Ok(Self {
            id: spec.id.clone(),
            name: manifest
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| spec.id.name().to_string()),
            version: spec.version.clone(),
            declared_version: manifest.version,
            reference,
            manifest_name: manifest_name.to_string(),
            manifest_bytes,
            src: manifest.src,
            dependencies: manifest.dependencies,
            development: manifest.development,
            prefix: manifest.prefix,
            install: manifest.install,
        })
    }

    /// Version recorded for an installed package
    ///
    /// A pinned ref wins; an unpinned install reports the version the manifest
    /// declares, falling back to the default ref.
    pub fn resolved_version(&self) -> &str {
        if self.version != DEFAULT_VERSION {
            return &self.version;
        }
        self.declared_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.version)
    }

    /// Cache key for this package's source files
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// Flattened destination filename for a `src` entry
    pub fn source_file_name(src: &str) -> Option<String> {
        Path::new(src)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }
}
