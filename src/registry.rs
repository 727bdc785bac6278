//! Package registries and slug resolution
//!
//! A registry is an index that maps `owner/name` identifiers to the repository
//! a package is downloaded from. Each configured registry's index is fetched
//! once when the resolver is built; [`RegistryResolver::find`] is then a pure
//! in-memory lookup that walks registries in order and returns the first match.
//!
//! Two index formats are understood:
//!
//! - JSON: `[{"id": "owner/name", "href": "https://...", "description": "..."}]`
//!   (optionally wrapped as `{"packages": [...]}`)
//! - the clib wiki markdown list: `- [owner/name](https://...) - description`
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::{HttpTransport, PackageIdentifier, RegistryEntry, RegistryResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let resolver = RegistryResolver::fetch(
//!     vec![RegistryEntry::new(clib_install::registry::DEFAULT_REGISTRY)],
//!     &transport,
//! );
//!
//! let id: PackageIdentifier = "clibs/list".parse()?;
//! if let Some(reference) = resolver.find(&id) {
//!     println!("{} -> {}", id, reference.href);
//! }
//! # Ok(())
//! # }
//! ```

use crate::package::PackageIdentifier;
use crate::secrets::Secrets;
use crate::transport::Transport;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use url::Url;

/// Registry used when neither the project nor the user configures one
pub const DEFAULT_REGISTRY: &str = "https://github.com/clibs/clib/wiki/Packages";

/// A configured registry: display name, index endpoint and optional token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub endpoint: String,
    pub token: Option<String>,
}

impl RegistryEntry {
    /// Create an entry named after the endpoint's host
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let name = Url::parse(&endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| endpoint.clone());

        Self {
            name,
            endpoint,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// One package listed in a registry index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPackage {
    pub id: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonIndex {
    List(Vec<RegistryPackage>),
    Wrapped { packages: Vec<RegistryPackage> },
}

/// Where a resolved package is downloaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReference {
    /// Name of the registry that matched
    pub registry: String,
    /// Repository URL of the package
    pub href: String,
}

impl DownloadReference {
    /// Raw URL of `path` inside the package repository at `version`
    ///
    /// - GitHub: `https://raw.githubusercontent.com/<owner>/<repo>/<version>/<path>`
    /// - GitLab: `<href>/-/raw/<version>/<path>`
    /// - anything else: `<href>/<version>/<path>`
    pub fn file_url(&self, version: &str, path: &str) -> Result<String> {
        let href = self.href.trim_end_matches('/').trim_end_matches(".git");
        let path = path.trim_start_matches("./").trim_start_matches('/');
        let url = Url::parse(href)?;

        let host = url.host_str().unwrap_or_default();
        if host == "github.com" || host == "www.github.com" {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                .unwrap_or_default();
            if segments.len() < 2 {
                return Err(Error::Other(format!(
                    "GitHub repository URL must name an owner and repository: {}",
                    self.href
                )));
            }
            return Ok(format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                segments[0], segments[1], version, path
            ));
        }

        if host.contains("gitlab") {
            return Ok(format!("{}/-/raw/{}/{}", href, version, path));
        }

        Ok(format!("{}/{}/{}", href, version, path))
    }
}

/// URL the index of `endpoint` is actually downloaded from
///
/// GitHub wiki pages are served as rendered HTML; their markdown source lives
/// at `raw.githubusercontent.com/wiki/<owner>/<repo>/<Page>.md`.
pub fn index_url(endpoint: &str) -> String {
    if let Ok(url) = Url::parse(endpoint) {
        if url.host_str() == Some("github.com") {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                .unwrap_or_default();
            if let [owner, repo, "wiki", page] = segments.as_slice() {
                return format!(
                    "https://raw.githubusercontent.com/wiki/{}/{}/{}.md",
                    owner, repo, page
                );
            }
        }
    }
    endpoint.to_string()
}

/// One package line of the wiki list: `- [owner/name](href) - description`
static INDEX_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s*\[([^\]]+)\]\(([^)\s]+)\)(?:\s*[-–:]\s*(.*))?$")
        .expect("valid registry index line regex")
});

/// Parse a registry index in either JSON or wiki markdown form
pub fn parse_index(content: &str) -> Result<Vec<RegistryPackage>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let index: JsonIndex = serde_json::from_str(trimmed)?;
        return Ok(match index {
            JsonIndex::List(packages) => packages,
            JsonIndex::Wrapped { packages } => packages,
        });
    }

    let packages = content
        .lines()
        .filter_map(|line| INDEX_LINE_RE.captures(line))
        .filter(|caps| caps[1].contains('/'))
        .map(|caps| RegistryPackage {
            id: caps[1].trim().to_string(),
            href: caps[2].trim().to_string(),
            description: caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|d| !d.is_empty()),
        })
        .collect();

    Ok(packages)
}

/// Build the ordered registry list for a run
///
/// Project registries come first, then the user's configured ones. With none
/// configured the default clib registry is used. Tokens come from the secrets
/// entry for each endpoint's host.
pub fn registry_entries(
    project: &[String],
    configured: &[String],
    secrets: &Secrets,
) -> Vec<RegistryEntry> {
    let mut endpoints: Vec<&str> = Vec::new();
    for endpoint in project.iter().chain(configured.iter()) {
        if !endpoints.contains(&endpoint.as_str()) {
            endpoints.push(endpoint);
        }
    }
    if endpoints.is_empty() {
        endpoints.push(DEFAULT_REGISTRY);
    }

    endpoints
        .into_iter()
        .map(|endpoint| {
            let token = secrets.token_for_url(endpoint).map(str::to_string);
            RegistryEntry::new(endpoint).with_token(token)
        })
        .collect()
}

struct Registry {
    entry: RegistryEntry,
    packages: HashMap<PackageIdentifier, RegistryPackage>,
}

impl Registry {
    fn new(entry: RegistryEntry, listed: Vec<RegistryPackage>) -> Self {
        let mut packages = HashMap::new();
        for package in listed {
            match PackageIdentifier::parse(&package.id) {
                Ok(id) => {
                    packages.entry(id).or_insert(package);
                }
                Err(_) => {
                    tracing::debug!(registry = %entry.name, id = %package.id, "skipping malformed registry entry");
                }
            }
        }
        Self { entry, packages }
    }
}

/// Ordered set of registries with their fetched indexes
pub struct RegistryResolver {
    registries: Vec<Registry>,
    lookups: AtomicUsize,
}

impl RegistryResolver {
    /// Fetch every registry's index once
    ///
    /// A registry that cannot be fetched or parsed is kept in the search order
    /// with an empty index so the others still resolve.
    pub fn fetch(entries: Vec<RegistryEntry>, transport: &dyn Transport) -> Self {
        let indexes = entries
            .into_iter()
            .map(|entry| {
                let url = index_url(&entry.endpoint);
                let packages = transport
                    .get(&url, entry.token.as_deref())
                    .and_then(|bytes| parse_index(&String::from_utf8_lossy(&bytes)));

                match packages {
                    Ok(packages) => {
                        tracing::debug!(registry = %entry.name, packages = packages.len(), "fetched registry");
                        (entry, packages)
                    }
                    Err(e) => {
                        tracing::warn!(registry = %entry.name, error = %e, "unable to fetch registry");
                        (entry, Vec::new())
                    }
                }
            })
            .collect();

        Self::from_indexes(indexes)
    }

    /// Build a resolver from already-fetched indexes
    pub fn from_indexes(indexes: Vec<(RegistryEntry, Vec<RegistryPackage>)>) -> Self {
        Self {
            registries: indexes
                .into_iter()
                .map(|(entry, packages)| Registry::new(entry, packages))
                .collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Resolve `id` against the registries in order; first match wins
    pub fn find(&self, id: &PackageIdentifier) -> Option<DownloadReference> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let found = self.registries.iter().find_map(|registry| {
            registry.packages.get(id).map(|package| DownloadReference {
                registry: registry.entry.name.clone(),
                href: package.href.clone(),
            })
        });

        match &found {
            Some(reference) => {
                tracing::debug!(package = %id, registry = %reference.registry, "resolved")
            }
            None => tracing::debug!(package = %id, "not found in any registry"),
        }
        found
    }

    /// Number of `find` calls made so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of registries searched
    pub fn registry_count(&self) -> usize {
        self.registries.len()
    }

    /// Total packages across all registry indexes
    pub fn package_count(&self) -> usize {
        self.registries.iter().map(|r| r.packages.len()).sum()
    }
}
