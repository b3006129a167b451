//! GitHub adapter.
//!
//! Implements [`Provider`] over the GitHub REST API (contents and commits
//! endpoints). The concurrency token is the blob `sha` GitHub reports for a
//! file; writes send it back and GitHub rejects stale values.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | read / list | `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` |
//! | large folder | `GET /repos/{owner}/{repo}/git/trees/{branch}:{path}` |
//! | large blob | `GET /repos/{owner}/{repo}/git/blobs/{sha}` |
//! | create / update | `PUT /repos/{owner}/{repo}/contents/{path}` |
//! | delete | `DELETE /repos/{owner}/{repo}/contents/{path}` |
//! | history | `GET /repos/{owner}/{repo}/commits?path=&sha=&per_page=100` |
//!
//! # Status mapping
//!
//! | Status | Error |
//! |--------|-------|
//! | 404 | [`StoreError::NotFound`] |
//! | 409 | [`StoreError::Conflict`] |
//! | 422 mentioning `sha` | [`StoreError::Conflict`] |
//! | other non-2xx | [`StoreError::Transport`] with the status |
//!
//! Bodies that are not the expected JSON are [`StoreError::Protocol`].
//!
//! # Pagination
//!
//! History follows the `rel="next"` target of the `Link` header until the
//! last page. The contents API lists at most 1000 entries of a directory and
//! has no cursor, so a listing that reaches that cap is redone through the
//! git trees API, which returns the whole directory. A tree response marked
//! `truncated` is a protocol error.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use gitshelf_core::error::{Result, StoreError};
use gitshelf_core::filename;
use gitshelf_core::models::{
    join_path, CommitInfo, EntryKind, FileContent, FileMetadata, GitHubSettings, Page,
    ProviderKind, TreeEntry, WriteResult,
};
use gitshelf_core::provider::{ensure_placeholder, top_level_folders, Provider};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::transport::{
    query_string, uri_encode, uri_encode_path, HttpRequest, HttpResponse, Method, Transport,
};

/// REST root used when the settings leave `api_url` empty.
pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const HISTORY_PAGE_SIZE: &str = "100";
/// Most entries the contents API returns for one directory.
pub const CONTENTS_LISTING_LIMIT: usize = 1000;

/// [`Provider`] for one GitHub repository and branch.
pub struct GitHubProvider {
    settings: GitHubSettings,
    transport: Arc<dyn Transport>,
}

// ═══════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct Tree {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    /// Relative to the listed tree.
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Blob {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Sha,
    commit: Sha,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    commit: CommitDetail,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: CommitAuthor,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: String,
    #[serde(default)]
    email: Option<String>,
    date: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════

impl GitHubProvider {
    pub fn new(settings: GitHubSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn repo_url(&self) -> String {
        let api = self
            .settings
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/');
        format!(
            "{}/repos/{}/{}",
            api,
            uri_encode(self.settings.owner.trim()),
            uri_encode(self.settings.repo.trim())
        )
    }

    fn branch(&self) -> Option<&str> {
        self.settings
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    fn contents_url(&self, path: &str, git_ref: Option<&str>) -> String {
        let encoded = uri_encode_path(path);
        let mut url = if encoded.is_empty() {
            format!("{}/contents", self.repo_url())
        } else {
            format!("{}/contents/{}", self.repo_url(), encoded)
        };
        if let Some(git_ref) = git_ref {
            url.push('?');
            url.push_str(&query_string(&[("ref", git_ref)]));
        }
        url
    }

    fn request(&self, method: Method, url: String) -> HttpRequest {
        HttpRequest::new(method, url)
            .header("Authorization", format!("Bearer {}", self.settings.pat.trim()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: HttpRequest, path: &str) -> Result<HttpResponse> {
        let resp = self.transport.send(request).await?;
        check_status(resp, path)
    }

    /// Fetch a file at `git_ref` (or the configured branch) and decode it.
    async fn fetch_file(&self, path: &str, git_ref: Option<&str>) -> Result<FileContent> {
        let url = self.contents_url(path, git_ref.or(self.branch()));
        let resp = self.send(self.request(Method::Get, url), path).await?;
        let file: ContentFile = resp.json("contents response")?;

        let content = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_base64(encoded, &resp.body)?,
            // Files over 1 MB come back without inline content.
            (Some("none"), _) | (None, None) => self.fetch_blob(&file.sha).await?,
            _ => {
                return Err(StoreError::protocol(
                    format!("unsupported content encoding for {path}"),
                    resp.body,
                ))
            }
        };
        Ok(FileContent {
            content,
            sha: file.sha,
        })
    }

    async fn fetch_blob(&self, sha: &str) -> Result<String> {
        debug!(sha, "fetching large file through the blobs API");
        let url = format!("{}/git/blobs/{}", self.repo_url(), uri_encode(sha));
        let resp = self.send(self.request(Method::Get, url), sha).await?;
        let blob: Blob = resp.json("blob response")?;
        if blob.encoding != "base64" {
            return Err(StoreError::protocol(
                format!("unsupported blob encoding {}", blob.encoding),
                resp.body,
            ));
        }
        decode_base64(&blob.content, &resp.body)
    }

    /// List `folder` through the git trees API.
    async fn list_tree(&self, folder: &str) -> Result<Vec<TreeEntry>> {
        let git_ref = uri_encode(self.branch().unwrap_or("HEAD"));
        let url = if folder.is_empty() {
            format!("{}/git/trees/{}", self.repo_url(), git_ref)
        } else {
            format!(
                "{}/git/trees/{}:{}",
                self.repo_url(),
                git_ref,
                uri_encode_path(folder)
            )
        };
        let resp = self.send(self.request(Method::Get, url), folder).await?;
        let tree: Tree = resp.json("tree listing")?;
        if tree.truncated {
            return Err(StoreError::protocol(
                format!("tree listing of {folder} is truncated"),
                resp.body,
            ));
        }

        Ok(tree
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::File,
                    "tree" => EntryKind::Dir,
                    _ => return None,
                };
                Some(TreeEntry {
                    path: join_path(folder, &item.path),
                    name: item.path,
                    kind,
                })
            })
            .collect())
    }
}

/// Map a non-2xx response onto the error taxonomy.
fn check_status(resp: HttpResponse, path: &str) -> Result<HttpResponse> {
    if resp.is_success() {
        return Ok(resp);
    }
    let detail = error_message(&resp.body);
    match resp.status {
        404 => Err(StoreError::not_found(path)),
        409 => Err(StoreError::conflict(path, detail)),
        422 if detail.to_ascii_lowercase().contains("sha") => {
            Err(StoreError::conflict(path, detail))
        }
        status => Err(StoreError::transport(
            format!("GitHub returned {status} for {path}: {detail}"),
            Some(status),
        )),
    }
}

/// Target of the `rel="next"` link in a `Link` header.
fn next_link(resp: &HttpResponse) -> Option<String> {
    resp.header("link")?.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

/// The `message` field of a GitHub error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| gitshelf_core::error::truncate_snippet(body))
}

/// Decode GitHub's line-wrapped base64 into UTF-8 text.
fn decode_base64(encoded: &str, body: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::protocol(format!("invalid base64 content: {e}"), body))?;
    String::from_utf8(bytes).map_err(|_| StoreError::protocol("file content is not UTF-8", body))
}

// ═══════════════════════════════════════════════════════════════════════
// Provider trait implementation
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl Provider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn get_file(&self, path: &str) -> Result<FileContent> {
        self.fetch_file(path, None).await
    }

    async fn get_file_metadata(&self, path: &str) -> Result<FileMetadata> {
        let file = self.fetch_file(path, None).await?;
        Ok(FileMetadata {
            sha: file.sha,
            path: path.to_string(),
            name: filename::basename(path).to_string(),
            content: file.content,
        })
    }

    async fn create_or_update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_sha: Option<&str>,
    ) -> Result<WriteResult> {
        let mut body = Map::new();
        body.insert("message".into(), json!(message));
        body.insert("content".into(), json!(STANDARD.encode(content.as_bytes())));
        if let Some(sha) = expected_sha {
            body.insert("sha".into(), json!(sha));
        }
        if let Some(branch) = self.branch() {
            body.insert("branch".into(), json!(branch));
        }

        let request = self
            .request(Method::Put, self.contents_url(path, None))
            .json(Value::Object(body));
        let resp = match self.send(request, path).await {
            // A create on an existing path is reported as 422 "sha wasn't supplied".
            Err(StoreError::Conflict { detail, .. }) if expected_sha.is_none() => {
                return Err(StoreError::conflict(
                    path,
                    format!("file already exists ({detail})"),
                ))
            }
            other => other?,
        };

        let put: PutResponse = resp.json("contents write response")?;
        debug!(path, sha = %put.content.sha, "wrote file");
        Ok(WriteResult {
            sha: put.content.sha,
            commit_sha: Some(put.commit.sha),
        })
    }

    async fn delete(&self, path: &str, message: &str, sha: &str) -> Result<()> {
        let mut body = Map::new();
        body.insert("message".into(), json!(message));
        body.insert("sha".into(), json!(sha));
        if let Some(branch) = self.branch() {
            body.insert("branch".into(), json!(branch));
        }
        let request = self
            .request(Method::Delete, self.contents_url(path, None))
            .json(Value::Object(body));
        self.send(request, path).await?;
        Ok(())
    }

    async fn list_page(&self, folder: &str, _cursor: Option<&str>) -> Result<Page> {
        let folder = folder.trim_matches('/');
        let url = self.contents_url(folder, self.branch());
        let resp = self.send(self.request(Method::Get, url), folder).await?;
        let listing: Vec<ContentEntry> = resp.json("directory listing")?;
        if listing.len() >= CONTENTS_LISTING_LIMIT {
            debug!(folder, "directory listing hit the contents API cap");
            return Ok(Page {
                entries: self.list_tree(folder).await?,
                next: None,
            });
        }

        let entries = listing
            .into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => return None,
                };
                Some(TreeEntry {
                    path: entry.path,
                    name: entry.name,
                    kind,
                })
            })
            .collect();
        Ok(Page {
            entries,
            next: None,
        })
    }

    async fn history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let mut params = vec![("path", path), ("per_page", HISTORY_PAGE_SIZE)];
        if let Some(branch) = self.branch() {
            params.push(("sha", branch));
        }
        let mut url = Some(format!(
            "{}/commits?{}",
            self.repo_url(),
            query_string(&params)
        ));

        let mut history = Vec::new();
        while let Some(page_url) = url.take() {
            let resp = self.send(self.request(Method::Get, page_url), path).await?;
            let commits: Vec<CommitEntry> = resp.json("commit history")?;
            if commits.is_empty() {
                break;
            }
            url = next_link(&resp);
            history.extend(commits.into_iter().map(|c| CommitInfo {
                sha: c.sha,
                message: c.commit.message,
                author_name: c.commit.author.name,
                author_email: c.commit.author.email,
                date: c.commit.author.date,
                url: c.html_url,
            }));
        }
        Ok(history)
    }

    async fn at_commit(&self, path: &str, commit: &str) -> Result<FileContent> {
        self.fetch_file(path, Some(commit)).await
    }

    async fn list_folders(&self) -> Result<BTreeSet<String>> {
        top_level_folders(self).await
    }

    async fn ensure_directory(&self, folder: &str) -> Result<()> {
        ensure_placeholder(self, folder).await
    }
}
