//! Test utilities and helpers for clib-install integration tests.
//!
//! This module provides an in-memory transport that records every request,
//! and a harness that publishes fixture packages into a fake registry.

#![allow(dead_code)]

use clib_install::registry::RegistryPackage;
use clib_install::{
    Error, InstallContext, PackageCache, RegistryEntry, RegistryResolver, Result, Secrets,
    Transport,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Index URL of the fixture registry
pub const REGISTRY_URL: &str = "https://registry.test/index.json";

/// Host serving fixture package files
pub const PACKAGE_HOST: &str = "https://example.test";

/// Repository URL of a fixture package
pub fn href(id: &str) -> String {
    format!("{}/{}", PACKAGE_HOST, id)
}

/// Raw URL of a file inside a fixture package
pub fn file_url(id: &str, version: &str, path: &str) -> String {
    format!("{}/{}/{}", href(id), version, path)
}

/// Transport serving canned responses from memory
#[derive(Default)]
pub struct MockTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_bytes().to_vec());
    }

    /// Hold every response for `url` back by `delay`
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| u.as_str() == url).count()
    }

    /// Tokens sent with requests to `url`
    pub fn tokens_for(&self, url: &str) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, token)| token.clone())
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), token.map(str::to_string)));

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::FetchFailed {
                url: url.to_string(),
                reason: "HTTP 404 (not found)".to_string(),
            })
    }
}

/// Isolated project directory, cache and fixture registry
pub struct Harness {
    pub project: TempDir,
    pub cache_dir: TempDir,
    pub transport: MockTransport,
    pub secrets: Secrets,
    index: Vec<RegistryPackage>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            project: TempDir::new().expect("Failed to create project dir"),
            cache_dir: TempDir::new().expect("Failed to create cache dir"),
            transport: MockTransport::new(),
            secrets: Secrets::default(),
            index: Vec::new(),
        }
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    /// Publish `id` at `version` with a clib.json and its source files
    pub fn publish(&mut self, id: &str, version: &str, manifest: &str, files: &[(&str, &str)]) -> &mut Self {
        self.list(id);
        self.transport
            .serve(&file_url(id, version, "clib.json"), manifest);
        for (path, content) in files {
            self.transport.serve(&file_url(id, version, path), content);
        }
        self
    }

    /// Add `id` to the registry index without serving any files
    pub fn list(&mut self, id: &str) -> &mut Self {
        if !self.index.iter().any(|p| p.id == id) {
            self.index.push(RegistryPackage {
                id: id.to_string(),
                href: href(id),
                description: None,
            });
        }
        self
    }

    /// Serve the index and build a resolver from it
    pub fn resolver(&self) -> RegistryResolver {
        let index = serde_json::to_string(&self.index).expect("Failed to serialize index");
        self.transport.serve(REGISTRY_URL, &index);
        RegistryResolver::fetch(vec![RegistryEntry::new(REGISTRY_URL)], &self.transport)
    }

    pub fn cache(&self) -> PackageCache {
        PackageCache::new(self.cache_dir.path(), chrono::Duration::days(30))
    }

    pub fn ctx<'a>(&'a self, resolver: &'a RegistryResolver, cache: &'a PackageCache) -> InstallContext<'a> {
        InstallContext {
            resolver,
            cache,
            transport: &self.transport,
            secrets: &self.secrets,
        }
    }

    pub fn project_dir(&self) -> &Path {
        self.project.path()
    }

    /// Installed location of a package directory
    pub fn dep(&self, name: &str) -> PathBuf {
        self.project.path().join("deps").join(name)
    }

    /// Write the project's clib.json
    pub fn write_manifest(&self, json: &str) -> PathBuf {
        let path = self.project.path().join("clib.json");
        fs::write(&path, json).expect("Failed to write clib.json");
        path
    }

    pub fn read_manifest(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.project.path().join("clib.json"))
            .expect("Failed to read clib.json");
        serde_json::from_str(&content).expect("clib.json is not valid JSON")
    }
}

/// Assert that a file exists
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a file does not exist
pub fn assert_file_not_exists(path: &Path) {
    assert!(!path.exists(), "Expected file to not exist: {}", path.display());
}
