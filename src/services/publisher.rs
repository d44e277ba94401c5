use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Adapter to the external content-addressed store. Nothing here is retried;
/// the pipeline treats every failure as terminal for the job.
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    /// Add a single blob, returning its content address.
    async fn add(&self, bytes: Vec<u8>) -> Result<String, PublishError>;

    /// Add a directory tree, returning the root content address.
    async fn add_directory(&self, dir: &Path) -> Result<String, PublishError>;

    /// Instruct the store to retain `address` against garbage collection.
    async fn pin(&self, address: &str) -> Result<(), PublishError>;

    /// Release a previously added or pinned address.
    async fn unpin(&self, address: &str) -> Result<(), PublishError>;

    /// Fetch the blob at `address` into `destination`.
    async fn get(&self, address: &str, destination: &Path) -> Result<(), PublishError>;
}

/// Client for the IPFS (Kubo) HTTP API.
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
}

/// One line of the NDJSON `/api/v0/add` response.
#[derive(Debug, Deserialize)]
struct AddResponseEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PublishError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Collect every regular file under `dir`, with its path relative to `dir`.
    async fn collect_files(dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>, PublishError> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    let relative = path
                        .strip_prefix(dir)
                        .map_err(|_| {
                            PublishError::UnexpectedResponse(format!(
                                "file {} escapes {}",
                                path.display(),
                                dir.display()
                            ))
                        })?
                        .to_path_buf();
                    files.push((path, relative));
                }
            }
        }

        // Deterministic part order keeps the resulting address stable.
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

/// Pick the root directory entry out of the NDJSON add response.
fn parse_directory_root(body: &str, root_name: &str) -> Result<String, PublishError> {
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let entry: AddResponseEntry = serde_json::from_str(line)
            .map_err(|_| PublishError::UnexpectedResponse(line.to_string()))?;
        if entry.name == root_name {
            return Ok(entry.hash);
        }
    }
    Err(PublishError::UnexpectedResponse(format!(
        "add response has no entry for {root_name}"
    )))
}

#[async_trait]
impl ContentPublisher for IpfsClient {
    async fn add(&self, bytes: Vec<u8>) -> Result<String, PublishError> {
        let form = Form::new().part("file", Part::bytes(bytes));
        let response = self
            .http
            .post(self.endpoint("add"))
            .multipart(form)
            .send()
            .await?;
        let body = self.check(response).await?.text().await?;

        let entry: AddResponseEntry = serde_json::from_str(body.trim())
            .map_err(|_| PublishError::UnexpectedResponse(body.clone()))?;
        Ok(entry.hash)
    }

    async fn add_directory(&self, dir: &Path) -> Result<String, PublishError> {
        let root_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PublishError::UnexpectedResponse(format!("{} has no directory name", dir.display()))
            })?;

        let mut form = Form::new();
        for (path, relative) in Self::collect_files(dir).await? {
            let bytes = tokio::fs::read(&path).await?;
            let part_name = format!("{}/{}", root_name, relative.to_string_lossy());
            form = form.part("file", Part::bytes(bytes).file_name(part_name));
        }

        let response = self
            .http
            .post(self.endpoint("add"))
            .multipart(form)
            .send()
            .await?;
        let body = self.check(response).await?.text().await?;

        parse_directory_root(&body, &root_name)
    }

    async fn pin(&self, address: &str) -> Result<(), PublishError> {
        let response = self
            .http
            .post(self.endpoint("pin/add"))
            .query(&[("arg", address), ("recursive", "true")])
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn unpin(&self, address: &str) -> Result<(), PublishError> {
        let response = self
            .http
            .post(self.endpoint("pin/rm"))
            .query(&[("arg", address)])
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn get(&self, address: &str, destination: &Path) -> Result<(), PublishError> {
        let response = self
            .http
            .post(self.endpoint("cat"))
            .query(&[("arg", address)])
            .send()
            .await?;
        let bytes = self.check(response).await?.bytes().await?;
        tokio::fs::write(destination, &bytes).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("content store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("content store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected content store response: {0}")]
    UnexpectedResponse(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
