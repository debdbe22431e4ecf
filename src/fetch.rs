//! Document fetching for definition files and manifests.
//!
//! The factory never talks to a filesystem or network directly; it goes
//! through a [`DocumentFetcher`]. A non-2xx response is not an error at this
//! layer, callers inspect [`FetchResponse::is_ok`] the way they would inspect
//! an HTTP status.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("HTTP error fetching {path}: {message}")]
    Http { path: String, message: String },
    #[error("Unexpected status {status} for {path}")]
    Status { path: String, status: u16 },
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> FetchResult<FetchResponse>;
}

/// Serves documents from a directory. Absolute paths are taken relative to
/// `root`, relative paths (including `../x`) relative to `base`.
pub struct FsFetcher {
    root: PathBuf,
    base: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base: root.clone(),
            root,
        }
    }

    /// Directory relative paths are resolved against, e.g. the directory of
    /// the definition that declared a dependency.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    fn locate(&self, path: &str) -> PathBuf {
        let (start, rest) = match path.strip_prefix('/') {
            Some(rest) => (&self.root, rest),
            None => (&self.base, path),
        };
        let mut located = start.clone();
        for component in Path::new(rest).components() {
            match component {
                Component::ParentDir => {
                    located.pop();
                }
                Component::Normal(part) => located.push(part),
                _ => {}
            }
        }
        located
    }
}

#[async_trait]
impl DocumentFetcher for FsFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, path: &str) -> FetchResult<FetchResponse> {
        let located = self.locate(path);
        match tokio::fs::read_to_string(&located).await {
            Ok(body) => Ok(FetchResponse::ok(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No document at {}", located.display());
                Ok(FetchResponse::not_found())
            }
            Err(e) => Err(FetchError::Io {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Fetches documents over HTTP relative to a base URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches("./").trim_start_matches('/'))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, path: &str) -> FetchResult<FetchResponse> {
        let http_error = |e: reqwest::Error| FetchError::Http {
            path: path.to_string(),
            message: e.to_string(),
        };
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(http_error)?;
        Ok(FetchResponse { status, body })
    }
}

/// In-memory documents keyed by path. Counts every request, which makes it
/// handy for asserting how often a location was hit.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: DashMap<String, String>,
    requests: DashMap<String, usize>,
    total: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, body: impl Into<String>) {
        self.documents.insert(path.into(), body.into());
    }

    pub fn requests_for(&self, path: &str) -> usize {
        self.requests.get(path).map(|n| *n).unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentFetcher for MemoryFetcher {
    async fn fetch(&self, path: &str) -> FetchResult<FetchResponse> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.requests.entry(path.to_string()).or_insert(0) += 1;
        Ok(self
            .documents
            .get(path)
            .map(|body| FetchResponse::ok(body.clone()))
            .unwrap_or_else(FetchResponse::not_found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_fetcher_resolves_relative_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("components").join("card");
        std::fs::create_dir_all(&card).unwrap();
        std::fs::write(card.join("card.json"), r#"{"name":"card"}"#).unwrap();

        let fetcher = FsFetcher::new(dir.path()).with_base(dir.path().join("components/badge"));

        let absolute = fetcher.fetch("/components/card/card.json").await.unwrap();
        assert!(absolute.is_ok());
        let relative = fetcher.fetch("../card/card.json").await.unwrap();
        assert_eq!(relative.body, r#"{"name":"card"}"#);
    }

    #[tokio::test]
    async fn test_fs_fetcher_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FsFetcher::new(dir.path());
        let response = fetcher.fetch("/nope.json").await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_memory_fetcher_counts_requests() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("/a.json", "{}");
        assert!(fetcher.fetch("/a.json").await.unwrap().is_ok());
        assert!(!fetcher.fetch("/b.json").await.unwrap().is_ok());
        assert_eq!(fetcher.requests_for("/a.json"), 1);
        assert_eq!(fetcher.total_requests(), 2);
    }

    #[test]
    fn test_http_url_join() {
        let fetcher = HttpFetcher::new("http://localhost:8080/");
        assert_eq!(
            fetcher.url("/components/a/a.json"),
            "http://localhost:8080/components/a/a.json"
        );
        assert_eq!(fetcher.url("./x.json"), "http://localhost:8080/x.json");
    }

    /// Answers each connection with the next canned `(status line, body)`.
    async fn serve(replies: Vec<(&'static str, &'static str)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_status_and_body() {
        let base = serve(vec![("200 OK", r#"{"name":"card"}"#), ("404 Not Found", "")]).await;
        let fetcher = HttpFetcher::new(base);

        let found = fetcher.fetch("/components/card/card.json").await.unwrap();
        assert!(found.is_ok());
        assert_eq!(found.body, r#"{"name":"card"}"#);

        let missing = fetcher.fetch("/components/nope/nope.json").await.unwrap();
        assert_eq!(missing.status, 404);
        assert!(!missing.is_ok());
    }

    #[tokio::test]
    async fn test_http_fetcher_unreachable_host_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(format!("http://{}", addr));
        let err = fetcher.fetch("/a.json").await.unwrap_err();
        assert!(matches!(err, FetchError::Http { ref path, .. } if path == "/a.json"));
    }
}
