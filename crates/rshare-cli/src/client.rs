//! HTTP client for an Rshare server.

use std::io::SeekFrom;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;

use rshare_core::file::FileDescriptor;
use rshare_core::web::handlers::{CreateSessionRequest, UploadResponse};

/// Session ticket as returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    /// Share code
    pub code: String,
    /// Expiry time (RFC 3339)
    pub expires_at: String,
    /// Seconds until expiry
    pub expires_in_secs: u64,
    /// Accepted files
    pub files: Vec<FileDescriptor>,
}

/// Per-file progress as returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct FileStatus {
    /// File index
    pub index: usize,
    /// File name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// Bytes uploaded so far
    pub bytes_transferred: u64,
    /// Declared size
    pub total_bytes: u64,
    /// File status
    pub status: String,
    /// Hex SHA-256, once complete
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Session progress as returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    /// Share code
    pub code: String,
    /// Session status
    pub status: String,
    /// Seconds until expiry
    pub expires_in_secs: u64,
    /// Per-file progress
    pub files: Vec<FileStatus>,
    /// Downloaders currently attached
    pub active_downloaders: usize,
    /// Bytes uploaded across all files
    pub bytes_transferred: u64,
    /// Declared bytes across all files
    pub total_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
    #[serde(default)]
    details: Option<String>,
}

/// Thin wrapper over the server's JSON API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    /// Create a client for the server at `base`.
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("rshare/{}", rshare_core::VERSION))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Create a session for `files`.
    pub async fn create_session(&self, files: Vec<FileDescriptor>) -> Result<Ticket> {
        let response = self
            .http
            .post(self.url("/api/sessions"))
            .json(&CreateSessionRequest { files })
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        json_or_error(response).await
    }

    /// Progress of the session bound to `code`.
    pub async fn snapshot(&self, code: &str) -> Result<Snapshot> {
        let response = self
            .http
            .get(self.url(&format!("/api/sessions/{code}")))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        json_or_error(response).await
    }

    /// Cancel the session bound to `code`.
    pub async fn cancel(&self, code: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/api/sessions/{code}")))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    /// Upload `path` as file `index`, starting at byte `offset`.
    pub async fn upload(
        &self,
        code: &str,
        index: usize,
        path: &Path,
        offset: u64,
    ) -> Result<UploadResponse> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .http
            .put(self.url(&format!("/api/sessions/{code}/files/{index}")))
            .body(body)
            .send()
            .await
            .with_context(|| format!("Upload of {} failed", path.display()))?;
        json_or_error(response).await
    }

    /// Start downloading file `index`, optionally waiting until it is fully
    /// uploaded. The body is read by the caller.
    pub async fn download(&self, code: &str, index: usize, wait: bool) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url(&format!("/api/sessions/{code}/files/{index}")))
            .query(&[("wait", wait)])
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }
}

async fn json_or_error<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if response.status().is_success() {
        response
            .json()
            .await
            .context("Server sent an unexpected response")
    } else {
        Err(api_error(response).await)
    }
}

async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => {
            let mut message = match body.code {
                Some(code) => format!("[{code}] {}", body.message),
                None => body.message,
            };
            if let Some(details) = body.details {
                message.push_str(&format!(" ({details})"));
            }
            anyhow::anyhow!(message)
        }
        Err(_) => anyhow::anyhow!("Server returned {status}"),
    }
}

/// Fail unless `path` names a regular file, returning its descriptor.
pub fn describe_file(path: &Path) -> Result<FileDescriptor> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;

    Ok(FileDescriptor::guessed(name, metadata.len()))
}
