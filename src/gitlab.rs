//! GitLab adapter.
//!
//! Implements [`Provider`] over the GitLab v4 REST API. GitLab has no blob
//! sha on its files endpoint that it will check on write, so the concurrency
//! token is the file's `last_commit_id`. Every write goes through the
//! commits endpoint with a single action carrying that id; GitLab rejects the
//! commit when the file changed since, and the new commit's `id` becomes the
//! file's next token.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | read | `GET /projects/{id}/repository/files/{path}?ref={branch}` |
//! | write / delete | `POST /projects/{id}/repository/commits` |
//! | list | `GET /projects/{id}/repository/tree?path=&ref=&per_page=100&page=` |
//! | history | `GET /projects/{id}/repository/commits?path=&ref_name=&per_page=100&page=` |
//!
//! Listing pages and history pages follow the `X-Next-Page` response header.
//! Listing hands the header back as the page cursor; history reads every
//! page before returning.
//!
//! # Status mapping
//!
//! | Status | Error |
//! |--------|-------|
//! | 404 | [`StoreError::NotFound`] |
//! | 400 "has changed" / "already exists" | [`StoreError::Conflict`] |
//! | 400 "doesn't exist" | [`StoreError::NotFound`] |
//! | other non-2xx | [`StoreError::Transport`] with the status |

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use gitshelf_core::error::{truncate_snippet, Result, StoreError};
use gitshelf_core::filename;
use gitshelf_core::models::{
    CommitInfo, EntryKind, FileContent, FileMetadata, GitLabSettings, Page, ProviderKind,
    TreeEntry, WriteResult,
};
use gitshelf_core::provider::{ensure_placeholder, top_level_folders, Provider};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::transport::{query_string, uri_encode, HttpRequest, HttpResponse, Method, Transport};

/// Branch used when the settings leave it empty.
pub const DEFAULT_BRANCH: &str = "main";
const PAGE_SIZE: &str = "100";

/// [`Provider`] for one GitLab project and branch.
pub struct GitLabProvider {
    settings: GitLabSettings,
    transport: Arc<dyn Transport>,
}

// ═══════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    content: String,
    encoding: String,
    last_commit_id: String,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CreatedCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    id: String,
    message: String,
    author_name: String,
    #[serde(default)]
    author_email: Option<String>,
    authored_date: DateTime<Utc>,
    #[serde(default)]
    web_url: Option<String>,
}

/// Kind of a single-action commit.
#[derive(Debug, Clone, Copy)]
enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════

impl GitLabProvider {
    pub fn new(settings: GitLabSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn project_url(&self) -> String {
        let instance = self.settings.instance_url.trim().trim_end_matches('/');
        let instance = instance.strip_suffix("/api/v4").unwrap_or(instance);
        format!(
            "{}/api/v4/projects/{}",
            instance,
            uri_encode(self.settings.project_id.trim())
        )
    }

    fn branch(&self) -> &str {
        match self.settings.branch.trim() {
            "" => DEFAULT_BRANCH,
            branch => branch,
        }
    }

    fn file_url(&self, path: &str, git_ref: &str) -> String {
        // The files endpoint takes the whole path as one encoded segment.
        format!(
            "{}/repository/files/{}?{}",
            self.project_url(),
            uri_encode(path.trim_matches('/')),
            query_string(&[("ref", git_ref)])
        )
    }

    fn request(&self, method: Method, url: String) -> HttpRequest {
        HttpRequest::new(method, url).header("PRIVATE-TOKEN", self.settings.token.trim())
    }

    async fn send(&self, request: HttpRequest, path: &str) -> Result<HttpResponse> {
        let resp = self.transport.send(request).await?;
        check_status(resp, path)
    }

    async fn fetch_file(&self, path: &str, git_ref: &str) -> Result<FileContent> {
        let url = self.file_url(path, git_ref);
        let resp = self.send(self.request(Method::Get, url), path).await?;
        let file: RepositoryFile = resp.json("repository file response")?;
        let content = match file.encoding.as_str() {
            "base64" => decode_base64(&file.content, &resp.body)?,
            "text" => file.content,
            other => {
                return Err(StoreError::protocol(
                    format!("unsupported content encoding {other}"),
                    resp.body,
                ))
            }
        };
        Ok(FileContent {
            content,
            sha: file.last_commit_id,
        })
    }

    /// Commit a single file action and return the new commit id.
    async fn commit(
        &self,
        action: Action,
        path: &str,
        content: Option<&str>,
        message: &str,
        last_commit_id: Option<&str>,
    ) -> Result<String> {
        let mut entry = Map::new();
        entry.insert("action".into(), json!(action.as_str()));
        entry.insert("file_path".into(), json!(path.trim_matches('/')));
        if let Some(content) = content {
            entry.insert("content".into(), json!(STANDARD.encode(content.as_bytes())));
            entry.insert("encoding".into(), json!("base64"));
        }
        if let Some(id) = last_commit_id {
            entry.insert("last_commit_id".into(), json!(id));
        }

        let body = json!({
            "branch": self.branch(),
            "commit_message": message,
            "actions": [Value::Object(entry)],
        });
        let url = format!("{}/repository/commits", self.project_url());
        let resp = self
            .send(self.request(Method::Post, url).json(body), path)
            .await?;
        let commit: CreatedCommit = resp.json("commit response")?;
        debug!(path, action = action.as_str(), commit = %commit.id, "committed");
        Ok(commit.id)
    }
}

/// Map a non-2xx response onto the error taxonomy.
///
/// GitLab reports commit-action failures as 400 with a human-readable
/// message, so the message text decides between conflict and missing file.
fn check_status(resp: HttpResponse, path: &str) -> Result<HttpResponse> {
    if resp.is_success() {
        return Ok(resp);
    }
    let detail = error_message(&resp.body);
    let lower = detail.to_ascii_lowercase();
    match resp.status {
        404 => Err(StoreError::not_found(path)),
        400 if lower.contains("has changed") || lower.contains("already exists") => {
            Err(StoreError::conflict(path, detail))
        }
        400 if lower.contains("doesn't exist") || lower.contains("does not exist") => {
            Err(StoreError::not_found(path))
        }
        status => Err(StoreError::transport(
            format!("GitLab returned {status} for {path}: {detail}"),
            Some(status),
        )),
    }
}

/// The `message` (or `error`) field of a GitLab error body, or the raw body.
fn error_message(body: &str) -> String {
    let value: Option<Value> = serde_json::from_str(body).ok();
    value
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .map(|m| match m {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| truncate_snippet(body))
}

fn decode_base64(encoded: &str, body: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::protocol(format!("invalid base64 content: {e}"), body))?;
    String::from_utf8(bytes).map_err(|_| StoreError::protocol("file content is not UTF-8", body))
}

/// Parse the `X-Next-Page` header; GitLab sends it empty on the last page.
fn next_page(resp: &HttpResponse) -> Option<String> {
    resp.header("X-Next-Page")
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .map(str::to_string)
}

// ═══════════════════════════════════════════════════════════════════════
// Provider trait implementation
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl Provider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn get_file(&self, path: &str) -> Result<FileContent> {
        self.fetch_file(path, self.branch()).await
    }

    async fn get_file_metadata(&self, path: &str) -> Result<FileMetadata> {
        let file = self.fetch_file(path, self.branch()).await?;
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
        let action = match expected_sha {
            Some(_) => Action::Update,
            None => Action::Create,
        };
        let id = self
            .commit(action, path, Some(content), message, expected_sha)
            .await?;
        Ok(WriteResult {
            sha: id.clone(),
            commit_sha: Some(id),
        })
    }

    async fn delete(&self, path: &str, message: &str, sha: &str) -> Result<()> {
        self.commit(Action::Delete, path, None, message, Some(sha))
            .await?;
        Ok(())
    }

    async fn list_page(&self, folder: &str, cursor: Option<&str>) -> Result<Page> {
        let folder = folder.trim_matches('/');
        let page = cursor.unwrap_or("1");
        let mut params = vec![
            ("ref", self.branch()),
            ("per_page", PAGE_SIZE),
            ("page", page),
        ];
        if !folder.is_empty() {
            params.insert(0, ("path", folder));
        }
        let url = format!(
            "{}/repository/tree?{}",
            self.project_url(),
            query_string(&params)
        );
        let resp = self.send(self.request(Method::Get, url), folder).await?;
        let items: Vec<TreeItem> = resp.json("repository tree")?;

        let entries = items
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::File,
                    "tree" => EntryKind::Dir,
                    _ => return None,
                };
                Some(TreeEntry {
                    path: item.path,
                    name: item.name,
                    kind,
                })
            })
            .collect();
        Ok(Page {
            entries,
            next: next_page(&resp),
        })
    }

    async fn history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let mut history = Vec::new();
        let mut page = Some("1".to_string());
        while let Some(current) = page.take() {
            let params = [
                ("path", path.trim_matches('/')),
                ("ref_name", self.branch()),
                ("per_page", PAGE_SIZE),
                ("page", current.as_str()),
            ];
            let url = format!(
                "{}/repository/commits?{}",
                self.project_url(),
                query_string(&params)
            );
            let resp = self.send(self.request(Method::Get, url), path).await?;
            let commits: Vec<CommitEntry> = resp.json("commit history")?;
            if commits.is_empty() {
                break;
            }
            page = next_page(&resp);
            history.extend(commits.into_iter().map(|c| CommitInfo {
                sha: c.id,
                message: c.message,
                author_name: c.author_name,
                author_email: c.author_email,
                date: c.authored_date,
                url: c.web_url,
            }));
        }
        Ok(history)
    }

    async fn at_commit(&self, path: &str, commit: &str) -> Result<FileContent> {
        self.fetch_file(path, commit).await
    }

    async fn list_folders(&self) -> Result<BTreeSet<String>> {
        top_level_folders(self).await
    }

    async fn ensure_directory(&self, folder: &str) -> Result<()> {
        ensure_placeholder(self, folder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedTransport;

    fn provider(instance: &str, branch: &str) -> GitLabProvider {
        let settings = GitLabSettings {
            instance_url: instance.into(),
            project_id: "group/notes".into(),
            token: "tok".into(),
            branch: branch.into(),
        };
        GitLabProvider::new(settings, Arc::new(ScriptedTransport::new()))
    }

    #[test]
    fn test_project_url_encodes_namespace_path() {
        let p = provider("https://gitlab.example.com/", "");
        assert_eq!(
            p.project_url(),
            "https://gitlab.example.com/api/v4/projects/group%2Fnotes"
        );
        assert_eq!(p.branch(), "main");
    }

    #[test]
    fn test_instance_url_with_api_suffix() {
        let p = provider("https://gitlab.example.com/api/v4", "dev");
        assert_eq!(
            p.file_url("tasks/a b.md", p.branch()),
            "https://gitlab.example.com/api/v4/projects/group%2Fnotes/repository/files/tasks%2Fa%20b.md?ref=dev"
        );
    }

    #[test]
    fn test_status_mapping() {
        let changed = check_status(
            HttpResponse::new(
                400,
                r#"{"message":"You are attempting to update a file that has changed since you started editing it."}"#,
            ),
            "a.md",
        )
        .unwrap_err();
        assert!(changed.is_retryable());

        let exists = check_status(
            HttpResponse::new(400, r#"{"message":"A file with this name already exists"}"#),
            "a.md",
        )
        .unwrap_err();
        assert!(matches!(exists, StoreError::Conflict { .. }));

        let missing = check_status(
            HttpResponse::new(400, r#"{"message":"A file with this name doesn't exist"}"#),
            "a.md",
        )
        .unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));

        let not_found = check_status(
            HttpResponse::new(404, r#"{"message":"404 File Not Found"}"#),
            "a.md",
        )
        .unwrap_err();
        assert!(matches!(not_found, StoreError::NotFound { .. }));

        let denied = check_status(
            HttpResponse::new(401, r#"{"message":"401 Unauthorized"}"#),
            "a.md",
        )
        .unwrap_err();
        assert!(matches!(
            denied,
            StoreError::Transport {
                status: Some(401),
                ..
            }
        ));
    }

    #[test]
    fn test_next_page_header() {
        let last = HttpResponse::new(200, "[]").with_header("X-Next-Page", "");
        assert_eq!(next_page(&last), None);
        let more = HttpResponse::new(200, "[]").with_header("x-next-page", "3");
        assert_eq!(next_page(&more).as_deref(), Some("3"));
    }
}
