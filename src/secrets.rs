//! Registry access tokens (`clib_secrets.json`)
//!
//! The secrets file maps a host name to the token used for requests to that
//! host:
//!
//! ```json
//! { "github.com": "ghp_xxx", "gitlab.example.com": "glpat-xxx" }
//! ```

use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

/// Default secrets filename, looked up in the project directory
pub const SECRETS_FILE: &str = "clib_secrets.json";

/// Host -> token map, read-only once loaded
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    tokens: HashMap<String, String>,
}

impl Secrets {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Load secrets from `path`; a missing file yields no secrets
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let tokens: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            Error::Other(format!(
                "Invalid secrets file {}: {}\n\
                 Expected a JSON object mapping hosts to tokens.",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), hosts = tokens.len(), "loaded secrets");
        Ok(Self { tokens })
    }

    /// Token for an exact host name
    pub fn get(&self, host: &str) -> Option<&str> {
        self.tokens.get(host).map(String::as_str)
    }

    /// Token for the host of `url`
    pub fn token_for_url(&self, url: &str) -> Option<&str> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.get(host).or_else(|| {
            // raw.githubusercontent.com serves files for github.com repositories
            if host == "raw.githubusercontent.com" {
                self.get("github.com")
            } else {
                None
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
