//! User configuration
//!
//! Configuration is stored in TOML format at `~/.clib/config.toml`. Every
//! section is optional; missing values fall back to the defaults below.
//!
//! ```toml
//! [install]
//! out_dir = "deps"
//! concurrency = 12
//!
//! [cache]
//! dir = "~/.cache/clib"
//! ttl_days = 30
//!
//! [registry]
//! urls = ["https://github.com/clibs/clib/wiki/Packages"]
//!
//! [auth]
//! token = "ghp_xxx"
//! secrets_file = "clib_secrets.json"
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! println!("Cache: {}", config.cache_dir()?.display());
//! println!("Registries: {:?}", config.registry.urls);
//! # Ok(())
//! # }
//! ```

use crate::cache::CACHE_TTL_DAYS;
use crate::secrets::SECRETS_FILE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// User configuration file (`~/.clib/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Output directory used when `--out` is not given
    #[serde(default)]
    pub out_dir: Option<PathBuf>,

    /// Worker pool size used when `--concurrency` is not given
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root; `~` is expanded
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    CACHE_TTL_DAYS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_days: default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry endpoints searched after the project's own
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token sent with every request when `--token` is not given
    #[serde(default)]
    pub token: Option<String>,

    /// Secrets file, relative to the project directory
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
}

fn default_secrets_file() -> String {
    SECRETS_FILE.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            secrets_file: default_secrets_file(),
        }
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// Uses CLIB_CONFIG_DIR if set, otherwise ~/.clib/config.toml
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(config_dir) = std::env::var("CLIB_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".clib").join("config.toml"))
    }

    /// Load config from the default path, or defaults if it doesn't exist
    ///
    /// Environment variable overrides:
    /// - `CLIB_TOKEN`: Overrides `auth.token`
    /// - `CLIB_CONFIG_DIR`: Overrides the config directory location
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Self::default_path()?)?;

        if let Ok(token) = std::env::var("CLIB_TOKEN") {
            if !token.is_empty() {
                config.auth.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load config from an explicit path, without environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Cache root: the configured directory, else the platform cache dir
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache.dir {
            return Ok(PathBuf::from(shellexpand::tilde(dir).to_string()));
        }

        dirs::cache_dir()
            .map(|dir| dir.join("clib"))
            .ok_or_else(|| Error::Other("Could not find a cache directory; set [cache] dir".to_string()))
    }

    /// Cache entry lifetime
    pub fn ttl(&self) -> Result<chrono::Duration> {
        chrono::Duration::try_days(self.cache.ttl_days.max(0)).ok_or_else(|| {
            Error::Other(format!(
                "Invalid [cache] ttl_days: {} is out of range",
                self.cache.ttl_days
            ))
        })
    }

    /// Secrets file location for a project
    pub fn secrets_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(shellexpand::tilde(&self.auth.secrets_file).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.ttl_days, CACHE_TTL_DAYS);
        assert_eq!(config.auth.secrets_file, SECRETS_FILE);
        assert!(config.registry.urls.is_empty());
        assert!(config.install.concurrency.is_none());
        assert_eq!(config.ttl().unwrap(), chrono::Duration::days(30));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(temp_dir.path().join("config.toml")).unwrap();
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[install]
concurrency = 4

[registry]
urls = ["https://registry.example.com/index.json"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.install.concurrency, Some(4));
        assert_eq!(config.registry.urls.len(), 1);
        assert_eq!(config.cache.ttl_days, CACHE_TTL_DAYS);
        assert_eq!(config.auth.secrets_file, SECRETS_FILE);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[install\nconcurrency = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::TomlDe(_))));
    }

    #[test]
    fn test_ttl_out_of_range_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[cache]\nttl_days = 9223372036854775807\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(matches!(config.ttl(), Err(Error::Other(_))));

        let mut config = Config::default();
        config.cache.ttl_days = -5;
        assert_eq!(config.ttl().unwrap(), chrono::Duration::zero());
    }

    #[test]
    fn test_cache_dir_from_config() {
        let mut config = Config::default();
        config.cache.dir = Some("/var/cache/clib".to_string());
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/var/cache/clib"));
    }

    #[test]
    fn test_secrets_path_is_project_relative() {
        let config = Config::default();
        assert_eq!(
            config.secrets_path(Path::new("/work/app")),
            PathBuf::from("/work/app/clib_secrets.json")
        );
    }
}
