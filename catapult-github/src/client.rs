//! The repository contents gateway.

use async_trait::async_trait;
use base64::prelude::*;
use catapult_core::{RemoteError, RemoteFile, RemoteStore};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{self, ErrorScope};

const REPO_READY_ATTEMPTS: u32 = 10;
const REPO_READY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
}

/// Contents-API entry; directory listings omit `content`.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

impl GitHubClient {
    /// Authenticate and resolve the repository owner.
    pub async fn connect(token: &str, repo: &str) -> Result<Self, RemoteError> {
        Self::connect_to(api::DEFAULT_API_BASE, token, repo).await
    }

    pub async fn connect_to(api_base: &str, token: &str, repo: &str) -> Result<Self, RemoteError> {
        let http = api::build_http(token)?;
        let owner = api::fetch_login(&http, api_base).await?;
        debug!(owner, repo, "connected to remote host");
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner,
            repo: repo.to_string(),
            branch: "main".to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/contents", self.repo_url())
        } else {
            format!("{}/contents/{}", self.repo_url(), path)
        }
    }

    /// Fetch a path's contents entry, `None` on 404.
    async fn get_entry(&self, path: &str) -> Result<Option<ContentEntry>, RemoteError> {
        let resp = self
            .http
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(api::transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::File { path, size: 0 }).await);
        }
        let entry: ContentEntry = resp.json().await.map_err(api::transport)?;
        Ok(Some(entry))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ContentEntry>, RemoteError> {
        let resp = self
            .http
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(api::transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            // Brand-new repository with no commits yet.
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }
        let entries: Vec<ContentEntry> = resp.json().await.map_err(api::transport)?;
        Ok(entries)
    }

    /// Decode an entry's payload, falling back to the blob endpoint when the
    /// listing response did not inline it (the API stops inlining above 1 MiB).
    async fn decode_content(&self, entry: &ContentEntry) -> Result<Vec<u8>, RemoteError> {
        let inline = match (entry.content.as_deref(), entry.encoding.as_deref()) {
            (Some(content), Some("base64")) if !content.is_empty() => Some(content.to_string()),
            _ => None,
        };
        let encoded = match inline {
            Some(c) => c,
            None => {
                let url = format!("{}/git/blobs/{}", self.repo_url(), entry.sha);
                let resp = self.http.get(url).send().await.map_err(api::transport)?;
                if !resp.status().is_success() {
                    return Err(api::error_from_response(
                        resp,
                        ErrorScope::File { path: &entry.path, size: entry.size },
                    )
                    .await);
                }
                let blob: BlobResponse = resp.json().await.map_err(api::transport)?;
                blob.content
            }
        };
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| RemoteError::Validation {
                path: entry.path.clone(),
                message: format!("undecodable content: {e}"),
            })
    }

    fn check_upload_size(&self, path: &str, size: u64) -> Result<(), RemoteError> {
        if size > api::UPLOAD_LIMIT_BYTES {
            return Err(RemoteError::FileTooLarge {
                path: path.to_string(),
                size,
                limit: api::UPLOAD_LIMIT_BYTES,
            });
        }
        Ok(())
    }

    async fn put_contents(
        &self,
        path: &str,
        content: &[u8],
        message: String,
        sha: Option<String>,
    ) -> Result<(), RemoteError> {
        let mut body = json!({
            "message": message,
            "content": BASE64_STANDARD.encode(content),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        let resp = self
            .http
            .put(self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(
                resp,
                ErrorScope::File { path, size: content.len() as u64 },
            )
            .await);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for GitHubClient {
    async fn ensure_repository_exists(&self) -> Result<(), RemoteError> {
        let resp = self
            .http
            .get(self.repo_url())
            .send()
            .await
            .map_err(api::transport)?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }

        info!(repo = %self.repo, "creating private repository");
        let body = json!({
            "name": self.repo,
            "private": true,
            "auto_init": true,
            "description": "Files synchronized by catapult",
        });
        let resp = self
            .http
            .post(format!("{}/user/repos", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }

        // Creation is eventually consistent; wait until reads come back.
        for attempt in 1..=REPO_READY_ATTEMPTS {
            tokio::time::sleep(REPO_READY_DELAY).await;
            let resp = self
                .http
                .get(self.repo_url())
                .send()
                .await
                .map_err(api::transport)?;
            if resp.status().is_success() {
                debug!(attempt, "repository is readable");
                return Ok(());
            }
        }
        Err(RemoteError::Repository {
            message: format!("repository {} not readable after creation", self.repo),
        })
    }

    async fn get_all_files_with_content(&self) -> Result<HashMap<String, RemoteFile>, RemoteError> {
        let mut files = HashMap::new();
        let mut dirs = vec![String::new()];

        while let Some(dir) = dirs.pop() {
            for entry in self.list_dir(&dir).await? {
                match entry.kind.as_str() {
                    "dir" => dirs.push(entry.path.clone()),
                    "file" => {
                        // Directory listings never inline content, so this
                        // fetches the full entry per file.
                        let full = match self.get_entry(&entry.path).await? {
                            Some(e) => e,
                            None => continue,
                        };
                        let content = self.decode_content(&full).await?;
                        files.insert(
                            entry.path.clone(),
                            RemoteFile {
                                path: entry.path,
                                size: content.len() as u64,
                                remote_id: full.sha,
                                content,
                            },
                        );
                    }
                    other => {
                        warn!(path = %entry.path, kind = other, "skipping unsupported entry");
                    }
                }
            }
        }

        debug!(files = files.len(), "fetched remote manifest");
        Ok(files)
    }

    async fn create_file(&self, path: &str, content: &[u8]) -> Result<(), RemoteError> {
        self.check_upload_size(path, content.len() as u64)?;
        info!(path, bytes = content.len(), "creating remote file");
        self.put_contents(path, content, format!("Add {path}"), None)
            .await
    }

    async fn update_file(&self, path: &str, content: &[u8]) -> Result<(), RemoteError> {
        self.check_upload_size(path, content.len() as u64)?;
        let sha = self.get_entry(path).await?.map(|e| e.sha);
        info!(path, bytes = content.len(), "updating remote file");
        self.put_contents(path, content, format!("Update {path}"), sha)
            .await
    }

    async fn delete_file(&self, path: &str) -> Result<(), RemoteError> {
        let entry = match self.get_entry(path).await? {
            Some(e) => e,
            // Already gone; deletion is idempotent.
            None => return Ok(()),
        };
        info!(path, "deleting remote file");
        let body = json!({
            "message": format!("Delete {path}"),
            "sha": entry.sha,
            "branch": self.branch,
        });
        let resp = self
            .http
            .delete(self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::File { path, size: 0 }).await);
        }
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, RemoteError> {
        Ok(self.get_entry(path).await?.is_some())
    }

    async fn get_file(&self, path: &str) -> Result<RemoteFile, RemoteError> {
        let entry = self.get_entry(path).await?.ok_or_else(|| RemoteError::Api {
            status: 404,
            message: format!("{path}: not found"),
        })?;
        let content = self.decode_content(&entry).await?;
        Ok(RemoteFile {
            path: entry.path,
            size: content.len() as u64,
            remote_id: entry.sha,
            content,
        })
    }
}
