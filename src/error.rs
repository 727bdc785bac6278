use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid package slug '{0}'")]
    InvalidSlug(String),

    #[error("Package {0} not found in any registry\n\n\
             Hint: check the spelling of the slug (owner/name) and that the registries\n\
             listed in clib.json or ~/.clib/config.toml are reachable.")]
    NotFound(String),

    #[error("Invalid local path: {0}")]
    LocalPathInvalid(String),

    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Failed to parse manifest {path}: {reason}")]
    ManifestParse { path: String, reason: String },

    #[error("Failed to save {0} to the project manifest")]
    ManifestWriteFailed(String),

    #[error("Dependency {dependency} of {package} failed to install: {source}")]
    DependencyInstallFailed {
        package: String,
        dependency: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Unable to install package {target}: {source}")]
    TargetFailed {
        target: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Install command for {package} failed ({status})")]
    InstallScriptFailed { package: String, status: String },

    #[error("{0}")]
    Other(String),
}
