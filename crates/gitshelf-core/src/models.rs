//! Core data models shared by the adapters, the dispatcher, and callers.
//!
//! A [`Document`] is a markdown task file plus its parsed header, addressed
//! by a repository-relative path and guarded by the provider's content hash.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, StoreError};
use crate::filename::{self, FilenameMetadata};
use crate::frontmatter::{self, Frontmatter};

/// Subfolder of a task folder that holds archived documents.
pub const ARCHIVE_DIR: &str = "archive";

/// Placeholder file that keeps an otherwise empty folder alive.
pub const PLACEHOLDER_FILE: &str = ".gitkeep";

/// A task document read from, or about to be written to, a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    /// Basename of `path`.
    pub name: String,
    /// Display title: frontmatter title, else decoded filename, else basename.
    pub title: String,
    /// Markdown body after the header block.
    pub content: String,
    /// `None` when the file has no header block.
    pub frontmatter: Option<Frontmatter>,
    /// Provider content hash; `None` for a document never read or written.
    pub sha: Option<String>,
}

impl Document {
    /// Parse a raw blob fetched from `path`.
    pub fn from_blob(path: &str, blob: &str, sha: Option<String>) -> Result<Self> {
        let parsed = frontmatter::parse(blob)?;
        Ok(Self {
            path: path.to_string(),
            name: filename::basename(path).to_string(),
            title: resolve_title(parsed.frontmatter.as_ref(), path),
            content: parsed.content,
            frontmatter: parsed.frontmatter,
            sha,
        })
    }

    /// Render the document back into a single blob.
    pub fn to_blob(&self) -> Result<String> {
        frontmatter::stringify(self.frontmatter.as_ref(), &self.content)
    }

    pub fn filename_metadata(&self) -> Option<FilenameMetadata> {
        filename::decode(&self.name)
    }

    /// Priority from the header, falling back to the filename.
    pub fn priority(&self) -> Option<u8> {
        self.frontmatter
            .as_ref()
            .and_then(|fm| fm.priority)
            .or_else(|| self.filename_metadata().map(|m| m.priority))
    }

    /// Creation date from the header, falling back to the filename.
    pub fn created_date(&self) -> Option<NaiveDate> {
        self.frontmatter
            .as_ref()
            .and_then(Frontmatter::created_date)
            .or_else(|| self.filename_metadata().map(|m| m.date))
    }

    pub fn is_archived(&self) -> bool {
        self.frontmatter.as_ref().is_some_and(Frontmatter::archived)
    }

    /// Folder part of `path` (empty for a root-level file).
    pub fn folder(&self) -> &str {
        parent_folder(&self.path)
    }

    /// The sha needed to update or delete this document.
    pub fn require_sha(&self) -> Result<&str> {
        self.sha.as_deref().ok_or_else(|| {
            StoreError::conflict(
                &self.path,
                "document has no sha; read it again before writing",
            )
        })
    }
}

/// Pick the display title for a document.
pub fn resolve_title(frontmatter: Option<&Frontmatter>, path: &str) -> String {
    if let Some(title) = frontmatter
        .and_then(|fm| fm.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return title.to_string();
    }
    match filename::decode(path) {
        Some(meta) => meta.title,
        None => filename::stem(path).to_string(),
    }
}

/// Folder part of a repository path.
pub fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(folder, _)| folder)
}

/// Join a folder and a name into a repository path.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Path of `path` once moved into its folder's archive subtree.
pub fn archived_path(path: &str) -> String {
    join_path(
        &join_path(parent_folder(path), ARCHIVE_DIR),
        filename::basename(path),
    )
}

/// Path of an archived document once restored to the folder above.
pub fn unarchived_path(path: &str) -> String {
    let folder = parent_folder(path);
    let restored = match folder.rsplit_once('/') {
        Some((parent, last)) if last == ARCHIVE_DIR => parent,
        None if folder == ARCHIVE_DIR => "",
        _ => folder,
    };
    join_path(restored, filename::basename(path))
}

/// Whether `path` sits directly inside an archive subtree.
pub fn in_archive(path: &str) -> bool {
    filename::basename(parent_folder(path)) == ARCHIVE_DIR
}

/// Order documents by priority (missing last), creation date, then path.
pub fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        let pa = a.priority().unwrap_or(u8::MAX);
        let pb = b.priority().unwrap_or(u8::MAX);
        pa.cmp(&pb)
            .then_with(|| a.created_date().cmp(&b.created_date()))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Raw file content and its concurrency token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub sha: String,
}

/// What a writer needs before it writes: the current hash plus content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub sha: String,
    pub path: String,
    pub name: String,
    pub content: String,
}

/// Outcome of a create, update, or delete commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// New concurrency token for the path.
    pub sha: String,
    /// Commit that carried the change, when the provider reports it.
    pub commit_sha: Option<String>,
}

/// One commit touching a document, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub date: DateTime<Utc>,
    pub url: Option<String>,
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a folder listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Whether this entry is a markdown document rather than a folder or placeholder.
    pub fn is_document(&self) -> bool {
        self.kind == EntryKind::File && self.name != PLACEHOLDER_FILE && self.name.ends_with(".md")
    }
}

/// One page of a folder listing; `next` is the opaque cursor of the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<TreeEntry>,
    pub next: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Provider settings
// ═══════════════════════════════════════════════════════════════════════

/// Which hosting provider a settings value targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    GitLab,
}

impl ProviderKind {
    /// Parse a provider tag as written in configuration.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(StoreError::config(format!("unsupported provider: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
        })
    }
}

/// Settings for a GitHub repository.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct GitHubSettings {
    pub pat: String,
    pub owner: String,
    pub repo: String,
    /// `None` targets the repository's default branch.
    pub branch: Option<String>,
    /// REST root; `None` means `https://api.github.com`.
    pub api_url: Option<String>,
}

/// Settings for a GitLab project.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct GitLabSettings {
    pub instance_url: String,
    /// Numeric id or `namespace/project` path.
    pub project_id: String,
    pub token: String,
    /// Empty means `main`.
    pub branch: String,
}

impl fmt::Debug for GitHubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubSettings")
            .field("pat", &redact(&self.pat))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl fmt::Debug for GitLabSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabSettings")
            .field("instance_url", &self.instance_url)
            .field("project_id", &self.project_id)
            .field("token", &redact(&self.token))
            .field("branch", &self.branch)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Tagged choice of provider settings. Immutable for an operation's duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSettings {
    GitHub(GitHubSettings),
    GitLab(GitLabSettings),
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::GitHub(_) => ProviderKind::GitHub,
            Self::GitLab(_) => ProviderKind::GitLab,
        }
    }

    /// Required fields that are empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required: Vec<(&'static str, &str)> = match self {
            Self::GitHub(s) => vec![
                ("pat", s.pat.as_str()),
                ("owner", s.owner.as_str()),
                ("repo", s.repo.as_str()),
            ],
            Self::GitLab(s) => vec![
                ("instanceUrl", s.instance_url.as_str()),
                ("projectId", s.project_id.as_str()),
                ("token", s.token.as_str()),
            ],
        };
        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    /// Fail with a configuration error naming every missing field.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::missing_settings(
                &self.kind().to_string(),
                missing,
            ))
        }
    }
}
