//! Network retrieval of text, JSON, and binary payloads.
//!
//! Types:
//!
//! - `Transport` is the seam between the fetcher and the outside world; it
//!   returns a raw status and body and never interprets either.
//! - `HttpTransport` issues single-attempt GETs through `reqwest`.
//! - `FileTransport` serves `file://` URLs and answers a missing `index.json`
//!   with the listing of its directory.
//! - `SchemeTransport` dispatches to one of the above by URL scheme.
//! - `Fetcher` applies the status and decoding contract on top of a transport.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{DecodeError, FetchError, LoadError, TransportError};
use crate::listing::{list_images, INDEX_FILE_NAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = Client::builder().build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    async fn is_dir(path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn directory_listing(path: &Path) -> Option<PathBuf> {
        let is_index = path
            .file_name()
            .map(|name| name == INDEX_FILE_NAME)
            .unwrap_or(false);
        let parent = path.parent()?;
        (is_index && Self::is_dir(parent).await).then(|| parent.to_path_buf())
    }

    /// Directory enumeration has no async counterpart, so it runs on the
    /// blocking pool.
    async fn listing_response(dir: PathBuf) -> Result<TransportResponse, TransportError> {
        let listed = tokio::task::spawn_blocking(move || list_images(&dir))
            .await
            .map_err(|err| TransportError::Other(format!("directory listing task failed: {err}")))?;
        match listed {
            Ok(names) => {
                let body = serde_json::to_vec(&names)
                    .map_err(|err| TransportError::Other(err.to_string()))?;
                Ok(TransportResponse::ok(body))
            }
            Err(_) => Ok(TransportResponse::status(400)),
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        let path = url
            .to_file_path()
            .map_err(|_| TransportError::Other(format!("'{url}' is not a local file url")))?;
        if Self::is_dir(&path).await {
            return Ok(TransportResponse::status(404));
        }

        match tokio::fs::read(&path).await {
            Ok(body) => Ok(TransportResponse::ok(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let Some(dir) = Self::directory_listing(&path).await else {
                    return Ok(TransportResponse::status(404));
                };
                debug!(dir = %dir.display(), "serving directory listing as index");
                Self::listing_response(dir).await
            }
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(TransportResponse::status(403))
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

/// Routes `http`/`https` to the HTTP client and `file` to the filesystem.
#[derive(Debug, Clone)]
pub struct SchemeTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl SchemeTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            http: HttpTransport::new()?,
            file: FileTransport,
        })
    }
}

#[async_trait]
impl Transport for SchemeTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        match url.scheme() {
            "http" | "https" => self.http.get(url).await,
            "file" => self.file.get(url).await,
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Json,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn with_defaults() -> Result<Self, TransportError> {
        Ok(Self::new(SchemeTransport::new()?))
    }

    /// Single attempt; non-2xx statuses fail with `FetchError::Status`.
    pub async fn fetch(&self, uri: &Url, kind: PayloadKind) -> Result<Payload, LoadError> {
        match kind {
            PayloadKind::Text => self.text(uri).await.map(Payload::Text),
            PayloadKind::Json => self.json(uri).await.map(Payload::Json),
            PayloadKind::Binary => self.blob(uri).await.map(Payload::Binary),
        }
    }

    pub async fn text(&self, uri: &Url) -> Result<String, LoadError> {
        let body = self.body(uri).await?;
        String::from_utf8(body).map_err(|err| DecodeError::new(uri, err).into())
    }

    pub async fn json<T: DeserializeOwned>(&self, uri: &Url) -> Result<T, LoadError> {
        let body = self.body(uri).await?;
        serde_json::from_slice(&body).map_err(|err| DecodeError::new(uri, err).into())
    }

    pub async fn blob(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        Ok(self.body(uri).await?)
    }

    async fn body(&self, uri: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(%uri, "fetching resource");
        let response = self
            .transport
            .get(uri)
            .await
            .map_err(|source| FetchError::Transport {
                uri: uri.clone(),
                source,
            })?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
                uri: uri.clone(),
            });
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::testing::MemoryTransport;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn decodes_each_payload_kind() {
        let transport = MemoryTransport::new()
            .with("https://host/a.txt", "hello")
            .with("https://host/a.json", r#"{"k": [1, 2]}"#)
            .with("https://host/a.bin", vec![0u8, 159, 146, 150]);
        let fetcher = Fetcher::new(transport);

        let text = fetcher
            .fetch(&url("https://host/a.txt"), PayloadKind::Text)
            .await
            .unwrap();
        assert_eq!(text, Payload::Text("hello".into()));

        let json = fetcher
            .fetch(&url("https://host/a.json"), PayloadKind::Json)
            .await
            .unwrap();
        assert_eq!(json, Payload::Json(serde_json::json!({"k": [1, 2]})));

        let blob = fetcher
            .fetch(&url("https://host/a.bin"), PayloadKind::Binary)
            .await
            .unwrap();
        assert_eq!(blob, Payload::Binary(vec![0, 159, 146, 150]));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let fetcher = Fetcher::new(MemoryTransport::new());
        let err = fetcher.text(&url("https://host/missing")).await.unwrap_err();
        match err {
            LoadError::Fetch(fetch) => {
                assert_eq!(fetch.status(), Some(404));
                assert_eq!(fetch.uri().as_str(), "https://host/missing");
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let fetcher = Fetcher::new(MemoryTransport::new().with("https://host/bad.json", "{nope"));
        let err = fetcher
            .json::<serde_json::Value>(&url("https://host/bad.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode(ref decode) if decode.uri.as_str() == "https://host/bad.json"));
    }

    #[tokio::test]
    async fn file_transport_reads_files_and_reports_missing_ones() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("s.frag"), "void main() {}").unwrap();
        let base = Url::from_directory_path(temp.path()).unwrap();

        let found = FileTransport.get(&base.join("s.frag").unwrap()).await.unwrap();
        assert_eq!(found, TransportResponse::ok("void main() {}"));

        let missing = FileTransport.get(&base.join("nope.frag").unwrap()).await.unwrap();
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn file_transport_synthesizes_missing_index_from_directory() {
        let temp = tempfile::tempdir().unwrap();
        let frames = temp.path().join("frames");
        fs::create_dir(&frames).unwrap();
        fs::write(frames.join("b.png"), b"x").unwrap();
        fs::write(frames.join("a.webp"), b"x").unwrap();
        fs::write(frames.join("notes.txt"), b"x").unwrap();
        let index = Url::from_file_path(frames.join("index.json")).unwrap();

        let fetcher = Fetcher::new(FileTransport);
        let names: Vec<String> = fetcher.json(&index).await.unwrap();
        assert_eq!(names, vec!["a.webp".to_string(), "b.png".to_string()]);
    }

    #[tokio::test]
    async fn file_transport_answers_directories_and_orphan_indexes_with_404() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("frames")).unwrap();
        let base = Url::from_directory_path(temp.path()).unwrap();

        let directory = FileTransport.get(&base.join("frames").unwrap()).await.unwrap();
        assert_eq!(directory.status, 404);

        let orphan = FileTransport
            .get(&base.join("absent/index.json").unwrap())
            .await
            .unwrap();
        assert_eq!(orphan.status, 404);
    }

    #[tokio::test]
    async fn scheme_transport_rejects_unknown_schemes() {
        let transport = SchemeTransport::new().unwrap();
        let err = transport.get(&url("ftp://host/a.png")).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(ref scheme) if scheme == "ftp"));
    }
}
