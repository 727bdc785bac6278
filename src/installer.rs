//! Recursive package installation
//!
//! [`InstallEngine`] installs targets (registry slugs or local manifests) and
//! their full dependency trees into the output directory. One engine is one
//! install run: it owns the visited set and per-package state table, so a
//! package reached through several paths of the tree is fetched and installed
//! once.
//!
//! Each target is installed in two passes. The first resolves every slug in
//! the tree and fetches its manifest (cache first), claiming each package
//! once. The second writes package files in waves: a package is written only
//! after every dependency it was resolved with is installed. Sibling
//! subtrees, packages within a wave and source downloads run on a bounded
//! `rayon` pool; a failure stops new sibling work from starting and fails
//! every ancestor.
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::{
//!     HttpTransport, InstallContext, InstallEngine, InstallOptions, PackageCache,
//!     RegistryEntry, RegistryResolver, Secrets,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let resolver = RegistryResolver::fetch(
//!     vec![RegistryEntry::new(clib_install::registry::DEFAULT_REGISTRY)],
//!     &transport,
//! );
//! let cache = PackageCache::new("/tmp/clib-cache", chrono::Duration::days(30));
//! let secrets = Secrets::default();
//! let ctx = InstallContext {
//!     resolver: &resolver,
//!     cache: &cache,
//!     transport: &transport,
//!     secrets: &secrets,
//! };
//!
//! let options = InstallOptions::default();
//! let engine = InstallEngine::new(ctx, &options, None, ".");
//! engine.install_targets(&["clibs/list@0.2.0".to_string()])?;
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheLookup, PackageCache};
use crate::manifest::{Manifest, MANIFEST_NAMES};
use crate::manifest_writer::{ManifestWriter, Section};
use crate::package::{PackageDescriptor, PackageIdentifier, PackageSpec};
use crate::registry::{DownloadReference, RegistryResolver};
use crate::secrets::Secrets;
use crate::transport::Transport;
use crate::{Error, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

/// Worker pool size when neither the CLI nor the configuration sets one
pub const DEFAULT_CONCURRENCY: usize = 12;

/// Progress callback for install operations
///
/// Called with:
/// - `message`: Description of the step (e.g., "Installed clibs/list@0.2.0")
/// - `current`: Packages installed so far
/// - `total`: Total work when known, otherwise 0
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Run configuration, built once from CLI flags and user configuration
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Output directory; relative paths are taken from the project directory
    pub dir: PathBuf,
    /// Prefix used when the root manifest declares none
    pub prefix: Option<String>,
    /// Token sent with every request; overrides the secrets file
    pub token: Option<String>,
    pub dev: bool,
    pub save: bool,
    pub save_dev: bool,
    pub force: bool,
    pub global: bool,
    pub skip_cache: bool,
    pub concurrency: usize,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("deps"),
            prefix: None,
            token: None,
            dev: false,
            save: false,
            save_dev: false,
            force: false,
            global: false,
            skip_cache: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Collaborators shared by every step of a run
#[derive(Clone, Copy)]
pub struct InstallContext<'a> {
    pub resolver: &'a RegistryResolver,
    pub cache: &'a PackageCache,
    pub transport: &'a dyn Transport,
    pub secrets: &'a Secrets,
}

/// Per-package install state within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Pending,
    Resolving,
    Fetching,
    Installing,
    Installed,
    AlreadyInstalled,
    NotFound,
    FetchFailed,
    InstallFailed,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallState::Pending => "pending",
            InstallState::Resolving => "resolving",
            InstallState::Fetching => "fetching",
            InstallState::Installing => "installing",
            InstallState::Installed => "installed",
            InstallState::AlreadyInstalled => "already installed",
            InstallState::NotFound => "not found",
            InstallState::FetchFailed => "fetch failed",
            InstallState::InstallFailed => "install failed",
        };
        f.write_str(s)
    }
}

/// A package that reached `Installed`, in completion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub id: PackageIdentifier,
    pub version: String,
    pub path: PathBuf,
}

/// Run-scoped bookkeeping: visited set, state table, completion order
#[derive(Default)]
struct InstallRun {
    visited: Mutex<HashSet<PackageIdentifier>>,
    states: Mutex<HashMap<PackageIdentifier, InstallState>>,
    installed: Mutex<Vec<InstalledPackage>>,
}

impl InstallRun {
    /// Mark `id` visited; true only for the caller that claimed it first
    fn claim(&self, id: &PackageIdentifier) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone())
    }

    fn set_state(&self, id: &PackageIdentifier, state: InstallState) {
        tracing::debug!(package = %id, state = %state, "state");
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), state);
    }

    fn state(&self, id: &PackageIdentifier) -> Option<InstallState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    /// Record a completed package; returns how many have completed
    fn complete(&self, package: InstalledPackage) -> usize {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        installed.push(package);
        installed.len()
    }

    fn installed(&self) -> Vec<InstalledPackage> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Version of the latest completed install of `id`
    fn installed_version(&self, id: &PackageIdentifier) -> Option<String> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|package| &package.id == id)
            .map(|package| package.version.clone())
    }
}

/// A package resolved for installation, with the dependencies it was resolved with
struct PlannedPackage {
    spec: PackageSpec,
    descriptor: PackageDescriptor,
    dependencies: Vec<PackageIdentifier>,
    /// Package whose dependency list first reached this one
    parent: Option<PackageIdentifier>,
}

/// Packages resolved for one target, installed once the whole tree is known
#[derive(Default)]
struct Plan {
    claimed: Mutex<HashSet<PackageIdentifier>>,
    packages: Mutex<HashMap<PackageIdentifier, PlannedPackage>>,
}

impl Plan {
    fn claim(&self, id: &PackageIdentifier) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone())
    }

    fn insert(&self, package: PlannedPackage) {
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(package.spec.id.clone(), package);
    }

    fn into_packages(self) -> HashMap<PackageIdentifier, PlannedPackage> {
        self.packages.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Group planned packages into waves so that every package lands in a later
/// wave than each dependency it was resolved with
///
/// Depth is taken from the plan's roots first; an edge back onto the current
/// path closes a cycle and is ignored.
fn install_waves(packages: &HashMap<PackageIdentifier, PlannedPackage>) -> Vec<Vec<&PlannedPackage>> {
    fn depth<'p>(
        id: &PackageIdentifier,
        packages: &'p HashMap<PackageIdentifier, PlannedPackage>,
        depths: &mut HashMap<&'p PackageIdentifier, usize>,
        path: &mut HashSet<&'p PackageIdentifier>,
    ) -> Option<usize> {
        let (key, package) = packages.get_key_value(id)?;
        if let Some(&known) = depths.get(key) {
            return Some(known);
        }
        if !path.insert(key) {
            return None;
        }

        let level = package
            .dependencies
            .iter()
            .filter_map(|dep| depth(dep, packages, depths, path))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);

        path.remove(key);
        depths.insert(key, level);
        Some(level)
    }

    let mut order: Vec<&PackageIdentifier> = packages.keys().collect();
    order.sort_by_key(|id| (packages.get(*id).map_or(true, |p| p.parent.is_some()), *id));

    let mut depths = HashMap::new();
    for id in order {
        depth(id, packages, &mut depths, &mut HashSet::new());
    }

    let mut waves: Vec<Vec<&PlannedPackage>> = Vec::new();
    for (id, level) in depths {
        if let Some(package) = packages.get(id) {
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(package);
        }
    }
    for wave in &mut waves {
        wave.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
    }
    waves
}

fn dependency_specs(dependencies: &BTreeMap<String, String>) -> Result<Vec<PackageSpec>> {
    dependencies
        .iter()
        .map(|(name, version)| PackageSpec::from_dependency(name, version))
        .collect()
}

enum Target {
    Root,
    Manifest(PathBuf),
    Remote(PackageSpec),
}

fn classify_target(target: &str, project_dir: &Path) -> Result<Target> {
    if target == "." || target == "./" {
        return Ok(Target::Root);
    }

    let path = project_dir.join(target);
    if path.is_file() {
        return Ok(Target::Manifest(path));
    }

    let path_like = target.starts_with("./")
        || target.starts_with("../")
        || target.starts_with('/')
        || target.starts_with(".\\")
        || target.starts_with("..\\");
    if path_like {
        return match Manifest::find(&path) {
            Some(manifest) if path.is_dir() => Ok(Target::Manifest(manifest)),
            _ => Err(Error::LocalPathInvalid(target.to_string())),
        };
    }

    Ok(Target::Remote(PackageSpec::parse(target)?))
}

/// Installs targets and their dependency trees for one run
pub struct InstallEngine<'a> {
    ctx: InstallContext<'a>,
    options: &'a InstallOptions,
    root: Option<&'a Manifest>,
    project_dir: PathBuf,
    out_dir: PathBuf,
    prefix: Option<String>,
    pool: Option<rayon::ThreadPool>,
    run: InstallRun,
    progress: Option<ProgressCallback>,
}

impl<'a> InstallEngine<'a> {
    /// Create an engine for one run
    ///
    /// `root` is the project manifest, if there is one. Its `prefix` (or the
    /// CLI prefix when it declares none) becomes the `PREFIX` for every
    /// install command in the run.
    pub fn new<P: AsRef<Path>>(
        ctx: InstallContext<'a>,
        options: &'a InstallOptions,
        root: Option<&'a Manifest>,
        project_dir: P,
    ) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let out_dir = project_dir.join(&options.dir);

        let prefix = root
            .and_then(|m| m.prefix.clone())
            .or_else(|| options.prefix.clone())
            .map(|p| {
                let expanded = shellexpand::tilde(&p).to_string();
                project_dir.join(expanded).to_string_lossy().to_string()
            });

        let pool = if options.concurrency > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.concurrency)
                .thread_name(|i| format!("clib-install-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "unable to start worker pool, installing sequentially");
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(
            out = %out_dir.display(),
            prefix = prefix.as_deref().unwrap_or(""),
            concurrency = options.concurrency,
            force = options.force,
            global = options.global,
            skip_cache = options.skip_cache,
            dev = options.dev,
            "install run"
        );

        Self {
            ctx,
            options,
            root,
            project_dir,
            out_dir,
            prefix,
            pool,
            run: InstallRun::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Effective `PREFIX` for install commands
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Current state of a package in this run
    pub fn state(&self, id: &PackageIdentifier) -> Option<InstallState> {
        self.run.state(id)
    }

    /// Packages installed so far, in completion order
    pub fn installed(&self) -> Vec<InstalledPackage> {
        self.run.installed()
    }

    /// Install each target in order, stopping at the first failure
    ///
    /// An empty list installs the project's own dependencies.
    pub fn install_targets(&self, targets: &[String]) -> Result<()> {
        if targets.is_empty() {
            return self.install_target(".").map(|_| ()).map_err(|e| Error::TargetFailed {
                target: ".".to_string(),
                source: Box::new(e),
            });
        }

        for target in targets {
            self.install_target(target).map_err(|e| {
                tracing::error!(slug = %target, error = %e, "install failed");
                Error::TargetFailed {
                    target: target.clone(),
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }

    /// Install one top-level target: a slug or a local manifest
    pub fn install_target(&self, target: &str) -> Result<InstallState> {
        tracing::debug!(slug = target, "install target");

        match classify_target(target, &self.project_dir)? {
            Target::Root => {
                let root = self
                    .root
                    .ok_or_else(|| Error::LocalPathInvalid(format!("{} (no clib.json or package.json)", target)))?;
                self.install_local(root)?;
                Ok(InstallState::Installed)
            }
            Target::Manifest(path) => {
                let manifest = Manifest::load_file(&path)?;
                self.install_local(&manifest)?;
                Ok(InstallState::Installed)
            }
            Target::Remote(spec) => {
                let state = self.install_package(&spec)?;
                self.save(&spec);
                Ok(state)
            }
        }
    }

    /// Install the dependencies a local manifest declares
    pub fn install_local(&self, manifest: &Manifest) -> Result<()> {
        let label = manifest.name.clone().unwrap_or_else(|| ".".to_string());
        let mut specs = dependency_specs(&manifest.dependencies)?;
        if self.options.dev {
            specs.extend(dependency_specs(&manifest.development)?);
        }

        let plan = Plan::default();
        self.resolve_dependencies(&label, None, &specs, &plan)?;
        self.install_plan(plan, Some(label.as_str()))
    }

    fn install_package(&self, spec: &PackageSpec) -> Result<InstallState> {
        let plan = Plan::default();
        if !self.resolve(spec, None, true, &plan)? {
            return Ok(InstallState::AlreadyInstalled);
        }
        self.install_plan(plan, None)?;
        Ok(InstallState::Installed)
    }

    /// Resolve `spec` and, on its first visit, its whole subtree into `plan`
    ///
    /// Returns false when the package needs no work in this plan.
    fn resolve(
        &self,
        spec: &PackageSpec,
        parent: Option<&PackageIdentifier>,
        top_level: bool,
        plan: &Plan,
    ) -> Result<bool> {
        if !plan.claim(&spec.id) {
            return Ok(false);
        }
        let first_visit = self.run.claim(&spec.id);
        if !first_visit && !self.options.force {
            tracing::debug!(package = %spec, "already installed in this run");
            return Ok(false);
        }

        self.run.set_state(&spec.id, InstallState::Resolving);
        let reference = match self.ctx.resolver.find(&spec.id) {
            Some(reference) => reference,
            None => {
                self.run.set_state(&spec.id, InstallState::NotFound);
                return Err(Error::NotFound(spec.id.to_string()));
            }
        };

        self.run.set_state(&spec.id, InstallState::Fetching);
        let descriptor = self.fetch_descriptor(spec, reference).inspect_err(|_| {
            self.run.set_state(&spec.id, InstallState::FetchFailed);
        })?;

        // A forced revisit refreshes files but leaves the subtree alone
        let mut dependencies = Vec::new();
        if first_visit {
            let label = descriptor.id.to_string();
            let resolved = dependency_specs(&descriptor.dependencies)
                .and_then(|mut specs| {
                    if top_level && self.options.dev {
                        specs.extend(dependency_specs(&descriptor.development)?);
                    }
                    Ok(specs)
                })
                .and_then(|specs| {
                    self.resolve_dependencies(&label, Some(&descriptor.id), &specs, plan)?;
                    Ok(specs)
                });
            match resolved {
                Ok(specs) => dependencies = specs.into_iter().map(|s| s.id).collect(),
                Err(e) => {
                    self.run.set_state(&spec.id, InstallState::InstallFailed);
                    return Err(e);
                }
            }
        }

        plan.insert(PlannedPackage {
            spec: spec.clone(),
            descriptor,
            dependencies,
            parent: parent.cloned(),
        });
        Ok(true)
    }

    fn resolve_dependencies(
        &self,
        label: &str,
        parent: Option<&PackageIdentifier>,
        specs: &[PackageSpec],
        plan: &Plan,
    ) -> Result<()> {
        let resolve_one = |spec: &PackageSpec| -> Result<()> {
            self.resolve(spec, parent, false, plan)
                .map(|_| ())
                .map_err(|e| Error::DependencyInstallFailed {
                    package: label.to_string(),
                    dependency: spec.to_string(),
                    source: Box::new(e),
                })
        };

        match &self.pool {
            Some(pool) if specs.len() > 1 => pool.install(|| specs.par_iter().try_for_each(resolve_one)),
            _ => specs.iter().try_for_each(resolve_one),
        }
    }

    /// Install every planned package, one wave at a time
    ///
    /// `label` names the local manifest whose dependencies form the plan's roots.
    fn install_plan(&self, plan: Plan, label: Option<&str>) -> Result<()> {
        let packages = plan.into_packages();

        for wave in install_waves(&packages) {
            let install_one = |package: &&PlannedPackage| -> Result<()> {
                self.install_planned(package)
                    .map_err(|e| self.attribute_failure(&packages, package, e, label))
            };

            match &self.pool {
                Some(pool) if wave.len() > 1 => pool.install(|| wave.par_iter().try_for_each(install_one))?,
                _ => wave.iter().try_for_each(install_one)?,
            }
        }
        Ok(())
    }

    fn install_planned(&self, package: &PlannedPackage) -> Result<()> {
        let descriptor = &package.descriptor;

        self.run.set_state(&descriptor.id, InstallState::Installing);
        let path = self.install_files(descriptor).inspect_err(|_| {
            self.run.set_state(&descriptor.id, InstallState::InstallFailed);
        })?;

        self.run.set_state(&descriptor.id, InstallState::Installed);
        tracing::info!(package = %package.spec, path = %path.display(), "installed");

        let done = self.run.complete(InstalledPackage {
            id: descriptor.id.clone(),
            version: descriptor.resolved_version().to_string(),
            path,
        });
        if let Some(ref cb) = self.progress {
            cb(&format!("Installed {}", package.spec), done as u64, 0);
        }
        Ok(())
    }

    /// Fail every ancestor of `package` and wrap `error` once per level
    fn attribute_failure(
        &self,
        packages: &HashMap<PackageIdentifier, PlannedPackage>,
        package: &PlannedPackage,
        error: Error,
        label: Option<&str>,
    ) -> Error {
        let mut error = error;
        let mut current = package;

        while let Some(parent) = current.parent.as_ref().and_then(|id| packages.get(id)) {
            self.run.set_state(&parent.spec.id, InstallState::InstallFailed);
            error = Error::DependencyInstallFailed {
                package: parent.spec.id.to_string(),
                dependency: current.spec.to_string(),
                source: Box::new(error),
            };
            current = parent;
        }

        match label {
            Some(label) => Error::DependencyInstallFailed {
                package: label.to_string(),
                dependency: current.spec.to_string(),
                source: Box::new(error),
            },
            None => error,
        }
    }

    fn fetch_descriptor(&self, spec: &PackageSpec, reference: DownloadReference) -> Result<PackageDescriptor> {
        let key = format!("{}#manifest", spec);

        if let Some(descriptor) = self.cached_descriptor(spec, &reference, &key) {
            return Ok(descriptor);
        }

        let mut last_error = None;
        for name in MANIFEST_NAMES {
            let url = reference.file_url(&spec.version, name)?;
            match self.fetch(&url) {
                Ok(bytes) => {
                    let descriptor = PackageDescriptor::from_manifest(spec, reference, name, bytes)?;
                    let entry = [(name.to_string(), descriptor.manifest_bytes.clone())];
                    if let Err(e) = self.ctx.cache.put(&key, &entry) {
                        tracing::warn!(key = %key, error = %e, "unable to cache manifest");
                    }
                    return Ok(descriptor);
                }
                Err(e) => {
                    tracing::debug!(package = %spec, manifest = *name, error = %e, "manifest candidate unavailable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::FetchFailed {
            url: reference.href.clone(),
            reason: "no manifest".to_string(),
        }))
    }

    fn cached_descriptor(
        &self,
        spec: &PackageSpec,
        reference: &DownloadReference,
        key: &str,
    ) -> Option<PackageDescriptor> {
        if self.options.skip_cache {
            return None;
        }
        let CacheLookup::Hit(entry) = self.ctx.cache.get(key) else {
            return None;
        };

        let name = MANIFEST_NAMES.iter().find(|name| entry.contains(name))?;
        let parsed = entry
            .read(name)
            .and_then(|bytes| PackageDescriptor::from_manifest(spec, reference.clone(), name, bytes));
        match parsed {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring cached manifest");
                None
            }
        }
    }

    fn install_files(&self, descriptor: &PackageDescriptor) -> Result<PathBuf> {
        let dest = if self.options.global {
            self.ctx.cache.staging_dir(&descriptor.id, &descriptor.version)
        } else {
            self.out_dir.join(&descriptor.name)
        };
        fs::create_dir_all(&dest)?;

        let manifest_path = dest.join(&descriptor.manifest_name);
        if self.options.force || !manifest_path.exists() {
            fs::write(&manifest_path, &descriptor.manifest_bytes)?;
        }

        let sources: BTreeMap<String, String> = descriptor
            .src
            .iter()
            .filter_map(|src| PackageDescriptor::source_file_name(src).map(|name| (name, src.clone())))
            .collect();
        let pending: Vec<(String, String)> = sources
            .iter()
            .filter(|(name, _)| self.options.force || !dest.join(name).exists())
            .map(|(name, src)| (name.clone(), src.clone()))
            .collect();

        if !pending.is_empty() {
            let files = self.source_files(descriptor, &pending, pending.len() == sources.len())?;
            for (name, content) in &files {
                fs::write(dest.join(name), content)?;
            }
        }

        self.run_install_script(descriptor, &dest)?;
        Ok(dest)
    }

    /// Content for `pending` sources, from the cache when it holds all of them
    fn source_files(
        &self,
        descriptor: &PackageDescriptor,
        pending: &[(String, String)],
        complete: bool,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let key = descriptor.cache_key();

        if !self.options.skip_cache {
            if let CacheLookup::Hit(entry) = self.ctx.cache.get(&key) {
                if pending.iter().all(|(name, _)| entry.contains(name)) {
                    return pending
                        .iter()
                        .map(|(name, _)| -> Result<(String, Vec<u8>)> { Ok((name.clone(), entry.read(name)?)) })
                        .collect();
                }
            }
        }

        let fetch_one = |(name, src): &(String, String)| -> Result<(String, Vec<u8>)> {
            let url = descriptor.reference.file_url(&descriptor.version, src)?;
            Ok((name.clone(), self.fetch(&url)?))
        };

        let files: Vec<(String, Vec<u8>)> = match &self.pool {
            Some(pool) if pending.len() > 1 => {
                pool.install(|| pending.par_iter().map(fetch_one).collect::<Result<Vec<_>>>())?
            }
            _ => pending.iter().map(fetch_one).collect::<Result<Vec<_>>>()?,
        };

        // A partial download would leave holes in the cached entry
        if complete {
            if let Err(e) = self.ctx.cache.put(&key, &files) {
                tracing::warn!(key = %key, error = %e, "unable to cache sources");
            }
        }
        Ok(files)
    }

    fn run_install_script(&self, descriptor: &PackageDescriptor, dest: &Path) -> Result<()> {
        let Some(script) = descriptor.install.as_deref() else {
            return Ok(());
        };

        let prefix = self.prefix.clone().or_else(|| descriptor.prefix.clone());
        tracing::info!(package = %descriptor.id, command = script, "running install command");

        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.args(["/C", script]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", script]);
            c
        };
        command.current_dir(dest);
        if let Some(prefix) = prefix {
            command.env("PREFIX", prefix);
        }

        let status = command.status()?;
        if !status.success() {
            return Err(Error::InstallScriptFailed {
                package: descriptor.id.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let token = self
            .options
            .token
            .as_deref()
            .or_else(|| self.ctx.secrets.token_for_url(url));
        self.ctx.transport.get(url, token)
    }

    fn save(&self, spec: &PackageSpec) {
        let sections = [
            (self.options.save, Section::Dependencies),
            (self.options.save_dev, Section::Development),
        ];

        let version = self
            .run
            .installed_version(&spec.id)
            .unwrap_or_else(|| spec.version.clone());

        let writer = ManifestWriter::new(&self.project_dir);
        for (enabled, section) in sections {
            if !enabled {
                continue;
            }
            match writer.record(&spec.id, &version, section) {
                Ok(path) => tracing::debug!(package = %spec, path = %path.display(), "saved"),
                Err(e) => tracing::warn!(package = %spec, error = %e, "unable to save dependency"),
            }
        }
    }
}
