use anyhow::{Context, Result};
use clib_install::registry::registry_entries;
use clib_install::{
    Config, HttpTransport, InstallContext, InstallEngine, InstallOptions, Manifest, PackageCache,
    ProgressCallback, RegistryResolver, Secrets, DEFAULT_CONCURRENCY,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Flags accepted by the install command
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub packages: Vec<String>,
    pub out: Option<PathBuf>,
    pub prefix: Option<String>,
    pub quiet: bool,
    pub dev: bool,
    pub save: bool,
    pub save_dev: bool,
    pub force: bool,
    pub skip_cache: bool,
    pub global: bool,
    pub token: Option<String>,
    pub concurrency: Option<usize>,
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// Create an indicatif-based progress callback for CLI display
fn create_spinner_callback(spinner: ProgressBar) -> ProgressCallback {
    Arc::new(move |msg: &str, current: u64, total: u64| {
        if current >= total && total > 0 {
            spinner.finish_with_message(format!("✓ {}", msg));
        } else {
            spinner.set_message(format!("{} ({} done)", msg, current));
        }
    })
}

/// CLI flags first, then user configuration, then built-in defaults
fn build_options(args: &InstallArgs, config: &Config) -> InstallOptions {
    InstallOptions {
        dir: args
            .out
            .clone()
            .or_else(|| config.install.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from("deps")),
        prefix: args.prefix.clone(),
        token: args.token.clone().or_else(|| config.auth.token.clone()),
        dev: args.dev,
        save: args.save,
        save_dev: args.save_dev,
        force: args.force,
        global: args.global,
        skip_cache: args.skip_cache,
        concurrency: args
            .concurrency
            .or(config.install.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY),
    }
}

/// The project's manifest, if any
///
/// A run that only installs named packages treats an unreadable manifest as
/// absent; installing the project's own dependencies needs it.
fn load_root_manifest(project_dir: &Path, packages: &[String]) -> Result<Option<Manifest>> {
    match Manifest::load(project_dir) {
        Ok(manifest) => Ok(manifest),
        Err(e) if !packages.is_empty() && packages.iter().all(|p| p != "." && p != "./") => {
            tracing::warn!(error = %e, "ignoring unreadable project manifest");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run(args: InstallArgs) -> Result<()> {
    let project_dir = env::current_dir()?;
    let config = Config::load().context("Failed to load configuration")?;
    let options = build_options(&args, &config);

    let manifest = load_root_manifest(&project_dir, &args.packages)?;
    let secrets = Secrets::load(config.secrets_path(&project_dir))?;
    let transport = HttpTransport::new()?;

    let project_registries = manifest
        .as_ref()
        .map(|m| m.registries.clone())
        .unwrap_or_default();
    let entries = registry_entries(&project_registries, &config.registry.urls, &secrets);

    let fetching = (!args.quiet).then(|| spinner("Fetching registries..."));
    let resolver = RegistryResolver::fetch(entries, &transport);
    if let Some(s) = fetching {
        s.finish_and_clear();
    }
    tracing::info!(
        registries = resolver.registry_count(),
        packages = resolver.package_count(),
        "registries loaded"
    );

    let cache_dir = config.cache_dir()?;
    let cache = PackageCache::new(&cache_dir, config.ttl()?).skip_reads(options.skip_cache);

    let ctx = InstallContext {
        resolver: &resolver,
        cache: &cache,
        transport: &transport,
        secrets: &secrets,
    };

    let progress = (!args.quiet).then(|| spinner("Installing..."));
    let mut engine = InstallEngine::new(ctx, &options, manifest.as_ref(), &project_dir);
    if let Some(ref bar) = progress {
        engine = engine.with_progress(create_spinner_callback(bar.clone()));
    }

    let result = engine.install_targets(&args.packages);
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    result?;

    if !args.quiet {
        let installed = engine.installed();
        for package in &installed {
            println!(
                "  {}@{} -> {}",
                package.id,
                package.version,
                package.path.display()
            );
        }
        println!();
        println!("✓ Installed {} package(s)", installed.len());
    }

    Ok(())
}
