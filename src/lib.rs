//! clib-install - Install C packages and their dependency trees
//!
//! clib-install fetches packages listed in clib registries into a project's
//! `deps/` directory. It provides:
//!
//! - Slug resolution across an ordered list of registries (first match wins)
//! - Recursive, deduplicated dependency installation on a bounded worker pool
//! - An on-disk cache of manifests and sources with a 30 day TTL
//! - `--save` / `--save-dev` write-back into clib.json or package.json
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::{
//!     registry::registry_entries, Config, HttpTransport, InstallContext, InstallEngine,
//!     InstallOptions, Manifest, PackageCache, RegistryResolver, Secrets,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let manifest = Manifest::load(".")?;
//! let secrets = Secrets::load(config.secrets_path(std::path::Path::new(".")))?;
//!
//! let transport = HttpTransport::new()?;
//! let project_registries = manifest.as_ref().map(|m| m.registries.clone()).unwrap_or_default();
//! let resolver = RegistryResolver::fetch(
//!     registry_entries(&project_registries, &config.registry.urls, &secrets),
//!     &transport,
//! );
//! let cache = PackageCache::new(config.cache_dir()?, config.ttl()?);
//!
//! let ctx = InstallContext {
//!     resolver: &resolver,
//!     cache: &cache,
//!     transport: &transport,
//!     secrets: &secrets,
//! };
//! let options = InstallOptions::default();
//! let engine = InstallEngine::new(ctx, &options, manifest.as_ref(), ".");
//! engine.install_targets(&["clibs/buffer".to_string()])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`package`] - Slugs, package identifiers and resolved descriptors
//! - [`manifest`] - Parse clib.json and package.json
//! - [`registry`] - Fetch registry indexes and resolve slugs
//! - [`cache`] - On-disk package cache with TTL
//! - [`installer`] - Recursive dependency installation
//! - [`manifest_writer`] - Save installed packages back into the manifest
//! - [`transport`] - HTTP and file access
//! - [`secrets`] - Per-host registry tokens
//! - [`config`] - User configuration
//! - [`logging`] - Diagnostic logging setup
//! - [`error`] - Error types and result handling

pub mod cache;
pub mod config;
pub mod error;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod manifest_writer;
pub mod package;
pub mod registry;
pub mod secrets;
pub mod transport;

pub use cache::{CacheEntry, CacheLookup, PackageCache, CACHE_TTL_DAYS};
pub use config::Config;
pub use error::{Error, Result};
pub use installer::{
    InstallContext, InstallEngine, InstallOptions, InstallState, InstalledPackage,
    ProgressCallback, DEFAULT_CONCURRENCY,
};
pub use manifest::{Manifest, MANIFEST_NAMES};
pub use manifest_writer::{ManifestWriter, Section};
pub use package::{PackageDescriptor, PackageIdentifier, PackageSpec};
pub use registry::{DownloadReference, RegistryEntry, RegistryPackage, RegistryResolver};
pub use secrets::Secrets;
pub use transport::{HttpTransport, Transport};
