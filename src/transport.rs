//! Network access for registry indexes and package files
//!
//! The installer only needs "give me the bytes at this URL". [`Transport`] is
//! that seam; [`HttpTransport`] is the production implementation on top of a
//! shared blocking `reqwest` client, and also serves `file://` URLs so local
//! directories can act as registries.

use crate::{Error, Result};
use std::fs;
use url::Url;

/// Fetch the content at a URL
///
/// Implementations are shared between install workers, so every call must be
/// safe to issue concurrently.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("clib-install/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    fn get_file(&self, url: &Url) -> Result<Vec<u8>> {
        let path = url.to_file_path().map_err(|_| Error::FetchFailed {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

        fs::read(&path).map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn get_http(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| {
            let reason = if e.is_connect() {
                "cannot connect to host; check the URL and your network connection".to_string()
            } else if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            Error::FetchFailed {
                url: url.to_string(),
                reason,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                401 | 403 => format!(
                    "HTTP {} (private package? pass --token or add the host to clib_secrets.json)",
                    status.as_u16()
                ),
                404 => "HTTP 404 (not found)".to_string(),
                _ => format!("HTTP {}", status.as_u16()),
            };
            return Err(Error::FetchFailed {
                url: url.to_string(),
                reason,
            });
        }

        let bytes = response.bytes().map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            reason: format!("failed to read response: {}", e),
        })?;

        Ok(bytes.to_vec())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        tracing::info!(url, "fetch");

        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "file" => self.get_file(&parsed),
            "http" | "https" => self.get_http(url, token),
            other => Err(Error::FetchFailed {
                url: url.to_string(),
                reason: format!("unsupported URL scheme '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_success() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/clibs/list/master/clib.json")
            .with_status(200)
            .with_body(r#"{"name": "list"}"#)
            .create();

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/clibs/list/master/clib.json", server.url());
        let body = transport.get(&url, None).unwrap();

        assert_eq!(body, br#"{"name": "list"}"#);
        mock.assert();
    }

    #[test]
    fn test_get_sends_bearer_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/private.json")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_body("{}")
            .create();

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/private.json", server.url());
        transport.get(&url, Some("secret-token")).unwrap();

        mock.assert();
    }

    #[test]
    fn test_get_not_found() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing").with_status(404).create();

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/missing", server.url());
        let err = transport.get(&url, None).unwrap_err();

        match err {
            Error::FetchFailed { reason, .. } => assert!(reason.contains("404")),
            other => panic!("expected FetchFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_get_unauthorized_hint() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/secret").with_status(401).create();

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .get(&format!("{}/secret", server.url()), None)
            .unwrap_err();
        assert!(err.to_string().contains("--token"));
    }

    #[test]
    fn test_get_file_url() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        fs::write(&path, "[]").unwrap();

        let transport = HttpTransport::new().unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(transport.get(url.as_str(), None).unwrap(), b"[]");
    }

    #[test]
    fn test_get_missing_file_url() {
        let temp_dir = TempDir::new().unwrap();
        let url = Url::from_file_path(temp_dir.path().join("nope.json")).unwrap();

        let transport = HttpTransport::new().unwrap();
        assert!(matches!(
            transport.get(url.as_str(), None),
            Err(Error::FetchFailed { .. })
        ));
    }

    #[test]
    fn test_get_unsupported_scheme() {
        let transport = HttpTransport::new().unwrap();
        assert!(transport.get("ftp://example.com/x", None).is_err());
    }
}
