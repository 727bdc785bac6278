use clap::Parser;
use std::path::PathBuf;

mod commands;

/// clib-install - Install C packages from clib registries
#[derive(Parser)]
#[command(name = "clib-install")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Packages to install (e.g., clibs/list@0.2.0); none installs the project's dependencies
    packages: Vec<String>,

    /// Output directory (default: ./deps)
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Prefix exported as PREFIX to install commands
    #[arg(short = 'P', long, value_name = "DIR")]
    prefix: Option<String>,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Also install development dependencies
    #[arg(short, long)]
    dev: bool,

    /// Save installed packages to the manifest's dependencies
    #[arg(short = 'S', long)]
    save: bool,

    /// Save installed packages to the manifest's development dependencies
    #[arg(short = 'D', long)]
    save_dev: bool,

    /// Overwrite files that are already installed
    #[arg(short, long)]
    force: bool,

    /// Ignore cached manifests and sources
    #[arg(short = 'c', long)]
    skip_cache: bool,

    /// Install into the shared staging area instead of the output directory
    #[arg(short, long)]
    global: bool,

    /// Access token for private registries and repositories
    #[arg(short, long, value_name = "TOKEN")]
    token: Option<String>,

    /// Number of parallel install workers
    #[arg(short = 'C', long, value_name = "N")]
    concurrency: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    clib_install::logging::init_logging(cli.quiet);

    let result = commands::install::run(commands::install::InstallArgs {
        packages: cli.packages,
        out: cli.out,
        prefix: cli.prefix,
        quiet: cli.quiet,
        dev: cli.dev,
        save: cli.save,
        save_dev: cli.save_dev,
        force: cli.force,
        skip_cache: cli.skip_cache,
        global: cli.global,
        token: cli.token,
        concurrency: cli.concurrency,
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
