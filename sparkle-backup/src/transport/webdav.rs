//! WebDAV transport.
//!
//! Speaks the handful of WebDAV verbs the catalog needs over `reqwest`:
//! `MKCOL` for the backup directory, `PUT`/`GET`/`DELETE` for archives and a
//! depth-1 `PROPFIND` for listings. No timeouts or retries are applied here.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::naming::BackupDescriptor;
use super::{compile_glob, Transport};
use crate::archive::validate::validate_filename;
use crate::utils::{BackupError, Result};

const BACKEND: &str = "WebDAV";

/// Remote directory used when none is configured.
pub const DEFAULT_REMOTE_DIR: &str = "sparkle";

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#;

/// Connection settings for a WebDAV store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebDavConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_remote_dir")]
    pub dir: String,
}

fn default_remote_dir() -> String {
    DEFAULT_REMOTE_DIR.to_string()
}

/// Parse a WebDAV base URL, accepting only `http` and `https`.
pub fn validate_remote_url(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(BackupError::InvalidRemoteUrl("empty URL".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| BackupError::InvalidRemoteUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(BackupError::InvalidRemoteUrl(raw.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct WebDavTransport {
    client: Client,
    base: Url,
    username: String,
    password: String,
    dir_segments: Vec<String>,
}

impl WebDavTransport {
    /// Build a transport. The URL is validated before any client is created.
    pub fn new(config: &WebDavConfig) -> Result<Self> {
        let base = validate_remote_url(&config.url)?;
        let client = Client::builder()
            .build()
            .map_err(|e| BackupError::transport(BACKEND, format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            dir_segments: config
                .dir
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// URL of the backup directory, with a trailing slash.
    fn dir_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackupError::InvalidRemoteUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.extend(&self.dir_segments);
            segments.push("");
        }
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url> {
        validate_filename(name)?;
        let mut url = self.dir_url()?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackupError::InvalidRemoteUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.push(name);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| BackupError::transport(BACKEND, format!("{what} failed: {e}")))
    }

    fn status_error(&self, status: StatusCode, what: &str, name: &str) -> BackupError {
        match status {
            StatusCode::NOT_FOUND => BackupError::NotFound(name.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackupError::transport(
                BACKEND,
                format!("{what} rejected: authentication failed ({status})"),
            ),
            _ => BackupError::transport(BACKEND, format!("{what} failed with status {status}")),
        }
    }

    /// Create the backup directory. Errors are ignored: it usually exists.
    async fn ensure_remote_dir(&self) {
        let (Ok(url), Ok(method)) = (self.dir_url(), Method::from_bytes(b"MKCOL")) else {
            return;
        };
        match self.request(method, url).send().await {
            Ok(resp) => debug!("MKCOL {} -> {}", self.dir_segments.join("/"), resp.status()),
            Err(e) => debug!("MKCOL failed, continuing: {}", e),
        }
    }
}

#[async_trait]
impl Transport for WebDavTransport {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.object_url(name)?;
        self.ensure_remote_dir().await;

        let size = bytes.len();
        let resp = self.send(self.request(Method::PUT, url).body(bytes), "upload").await?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), "upload", name));
        }

        info!("Uploaded {} bytes to WebDAV as {}", size, name);
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let url = self.object_url(name)?;
        let resp = self.send(self.request(Method::GET, url), "download").await?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), "download", name));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackupError::transport(BACKEND, format!("download failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, glob: Option<&str>) -> Result<Vec<BackupDescriptor>> {
        let matcher = compile_glob(glob)?;
        let url = self.dir_url()?;
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| BackupError::transport(BACKEND, format!("list failed: {e}")))?;

        let request = self
            .request(method, url)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY);
        let resp = self.send(request, "list").await?;
        if !resp.status().is_success() {
            let dir = self.dir_segments.join("/");
            return Err(self.status_error(resp.status(), "list", &dir));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| BackupError::transport(BACKEND, format!("list failed: {e}")))?;

        Ok(file_names_from_multistatus(&body)
            .into_iter()
            .filter(|name| matcher.is_match(name))
            .map(|name| BackupDescriptor::parse(&name))
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let url = self.object_url(name)?;
        let resp = self.send(self.request(Method::DELETE, url), "delete").await?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), "delete", name));
        }

        info!("Deleted WebDAV backup {}", name);
        Ok(())
    }
}

/// Extract the names of non-collection resources from a PROPFIND response.
///
/// Names are the last segment of each `href`. Backup names are plain ASCII, so
/// percent-encoded hrefs simply fail the naming convention later.
fn file_names_from_multistatus(body: &str) -> Vec<String> {
    static RESPONSE: OnceLock<Regex> = OnceLock::new();
    static HREF: OnceLock<Regex> = OnceLock::new();
    static COLLECTION: OnceLock<Regex> = OnceLock::new();

    let response = RESPONSE.get_or_init(|| {
        Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?response\b.*?</(?:[A-Za-z0-9_]+:)?response\s*>")
            .expect("response pattern is valid")
    });
    let href = HREF.get_or_init(|| {
        Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?href\s*>(.*?)</(?:[A-Za-z0-9_]+:)?href\s*>")
            .expect("href pattern is valid")
    });
    let collection = COLLECTION.get_or_init(|| {
        Regex::new(r"<(?:[A-Za-z0-9_]+:)?collection\s*/?>").expect("collection pattern is valid")
    });

    response
        .find_iter(body)
        .filter(|block| !collection.is_match(block.as_str()))
        .filter_map(|block| {
            let caps = href.captures(block.as_str())?;
            let target = xml_text(&caps[1]);
            let name = target.trim().trim_end_matches('/').rsplit('/').next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Character data of an element: a CDATA section verbatim, otherwise text
/// with predefined and numeric entities decoded.
fn xml_text(raw: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();

    let raw = raw.trim();
    if let Some(cdata) = raw
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
    {
        return cdata.to_string();
    }

    let entity = ENTITY.get_or_init(|| {
        Regex::new(r"&(#x[0-9A-Fa-f]+|#[0-9]+|amp|lt|gt|quot|apos);")
            .expect("entity pattern is valid")
    });
    entity
        .replace_all(raw, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| name[1..].parse::<u32>())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
