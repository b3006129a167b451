//! Document store dispatcher.
//!
//! [`with_provider`] is the single entry point: it validates the settings,
//! selects the adapter for their provider tag, and returns a
//! [`DocumentStore`] exposing one provider-agnostic API. Incomplete settings
//! fail with [`StoreError::Config`](gitshelf_core::error::StoreError::Config)
//! before any request is built.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`read_document`](DocumentStore::read_document) | Fetch and parse one document |
//! | [`list_documents`](DocumentStore::list_documents) | Lazy stream of a folder's documents |
//! | [`create`](DocumentStore::create) / [`update`](DocumentStore::update) / [`delete`](DocumentStore::delete) | Raw blob writes |
//! | [`history`](DocumentStore::history) / [`at_commit`](DocumentStore::at_commit) | Audit log |
//! | [`create_task`](DocumentStore::create_task) | New task with encoded filename and header |
//! | [`update_document`](DocumentStore::update_document) | Typed update through the conflict-resolving writer |
//! | [`archive`](DocumentStore::archive) / [`unarchive`](DocumentStore::unarchive) | Move into or out of the archive subtree |

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use gitshelf_core::error::Result;
use gitshelf_core::filename::{self, DEFAULT_PRIORITY, PRIORITY_MAX, PRIORITY_MIN};
use gitshelf_core::frontmatter::{self, ChatMessage, Frontmatter};
use gitshelf_core::models::{
    archived_path, in_archive, join_path, unarchived_path, CommitInfo, Document, FileContent,
    FileMetadata, ProviderKind, ProviderSettings, WriteResult,
};
use gitshelf_core::provider::{DocumentStream, Provider};
use tracing::{info, warn};

use crate::github::GitHubProvider;
use crate::gitlab::GitLabProvider;
use crate::transport::Transport;
use crate::writer::{ConflictResolvingWriter, RetryPolicy, WriteOutcome};

/// Build the adapter for `settings`, failing fast on incomplete settings.
pub fn create_provider(
    settings: &ProviderSettings,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn Provider>> {
    settings.validate()?;
    Ok(match settings {
        ProviderSettings::GitHub(s) => Box::new(GitHubProvider::new(s.clone(), transport)),
        ProviderSettings::GitLab(s) => Box::new(GitLabProvider::new(s.clone(), transport)),
    })
}

/// Validate `settings` and return a store bound to the selected provider.
pub fn with_provider(
    settings: &ProviderSettings,
    transport: Arc<dyn Transport>,
) -> Result<DocumentStore> {
    Ok(DocumentStore::new(create_provider(settings, transport)?))
}

/// Input of [`DocumentStore::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub priority: u8,
    pub body: String,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: DEFAULT_PRIORITY,
            body: String::new(),
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Provider-agnostic document operations.
pub struct DocumentStore {
    provider: Box<dyn Provider>,
    retry: RetryPolicy,
}

impl DocumentStore {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Blob-level operations
    // ═══════════════════════════════════════════════════════════════════

    pub async fn read_document(&self, path: &str) -> Result<Document> {
        let file = self.provider.get_file(path).await?;
        Document::from_blob(path, &file.content, Some(file.sha))
    }

    pub fn list_documents<'a>(
        &'a self,
        folder: &'a str,
        include_archived: bool,
    ) -> DocumentStream<'a> {
        self.provider.list(folder, include_archived)
    }

    pub async fn list_all(&self, folder: &str, include_archived: bool) -> Result<Vec<Document>> {
        self.provider.list_all(folder, include_archived).await
    }

    /// Create a new file; fails with a conflict if `path` exists.
    pub async fn create(&self, path: &str, content: &str, message: &str) -> Result<WriteResult> {
        let result = self
            .provider
            .create_or_update(path, content, message, None)
            .await?;
        info!(path, sha = %result.sha, "created document");
        Ok(result)
    }

    /// Overwrite `path`, which must still be at `expected_sha`.
    pub async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_sha: &str,
    ) -> Result<WriteResult> {
        let result = self
            .provider
            .create_or_update(path, content, message, Some(expected_sha))
            .await?;
        info!(path, sha = %result.sha, "updated document");
        Ok(result)
    }

    pub async fn delete(&self, path: &str, message: &str, sha: &str) -> Result<()> {
        self.provider.delete(path, message, sha).await?;
        info!(path, "deleted document");
        Ok(())
    }

    pub async fn history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        self.provider.history(path).await
    }

    pub async fn at_commit(&self, path: &str, commit: &str) -> Result<FileContent> {
        self.provider.at_commit(path, commit).await
    }

    pub async fn ensure_directory(&self, folder: &str) -> Result<()> {
        self.provider.ensure_directory(folder).await
    }

    pub async fn list_folders(&self) -> Result<BTreeSet<String>> {
        self.provider.list_folders().await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Task operations
    // ═══════════════════════════════════════════════════════════════════

    /// Create a task file named `P<priority>--<today>--<slug>.md` in `folder`.
    pub async fn create_task(&self, folder: &str, task: NewTask) -> Result<Document> {
        let title = task.title.trim();
        let priority = task.priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        let now = Utc::now();
        let path = join_path(folder, &filename::encode(priority, now.date_naive(), title));

        let header = Frontmatter::new_task(title, priority, now);
        let blob = frontmatter::stringify(Some(&header), &task.body)?;
        let result = self
            .create(&path, &blob, &format!("Create task {title}"))
            .await?;
        Document::from_blob(&path, &blob, Some(result.sha))
    }

    /// Rewrite `path` with `transform(current)` through the conflict-resolving writer.
    pub async fn update_with<F>(
        &self,
        path: &str,
        message: &str,
        transform: F,
    ) -> Result<WriteOutcome>
    where
        F: FnMut(&FileMetadata) -> Result<String> + Send,
    {
        ConflictResolvingWriter::new(self.provider.as_ref(), self.retry)
            .update(path, message, transform)
            .await
    }

    /// Apply a typed edit to the header and body of `path`.
    ///
    /// The edit runs on freshly parsed content on every attempt. A file
    /// without a header stays without one unless the edit sets a field.
    pub async fn update_document<F>(
        &self,
        path: &str,
        message: &str,
        mut edit: F,
    ) -> Result<Document>
    where
        F: FnMut(&mut Frontmatter, &mut String) -> Result<()> + Send,
    {
        let outcome = self
            .update_with(path, message, |current| {
                let parsed = frontmatter::parse(&current.content)?;
                let had_header = parsed.frontmatter.is_some();
                let mut header = parsed.frontmatter.unwrap_or_default();
                let mut body = parsed.content;
                edit(&mut header, &mut body)?;
                let header = (had_header || !header.is_empty()).then_some(&header);
                frontmatter::stringify(header, &body)
            })
            .await?;
        Document::from_blob(path, &outcome.content, Some(outcome.sha))
    }

    pub async fn rename_title(&self, path: &str, title: &str) -> Result<Document> {
        let title = title.trim().to_string();
        let message = format!("Rename {} to {}", filename::basename(path), title);
        self.update_document(path, &message, |header, _| {
            header.title = Some(title.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_priority(&self, path: &str, priority: u8) -> Result<Document> {
        let priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        let message = format!("Set priority of {} to {}", filename::basename(path), priority);
        self.update_document(path, &message, |header, _| {
            header.priority = Some(priority);
            Ok(())
        })
        .await
    }

    pub async fn append_chat_message(&self, path: &str, message: ChatMessage) -> Result<Document> {
        let commit_message = format!(
            "Add {} message to {}",
            message.role,
            filename::basename(path)
        );
        self.update_document(path, &commit_message, |header, _| {
            header.push_chat_message(message.clone())
        })
        .await
    }

    /// Mark `path` archived and move it into its folder's archive subtree.
    pub async fn archive(&self, path: &str) -> Result<Document> {
        if in_archive(path) {
            return self.read_document(path).await;
        }
        self.relocate(path, &archived_path(path), true).await
    }

    /// Clear the archived flag and move `path` back out of the archive subtree.
    pub async fn unarchive(&self, path: &str) -> Result<Document> {
        if !in_archive(path) {
            return self.read_document(path).await;
        }
        self.relocate(path, &unarchived_path(path), false).await
    }

    /// Copy `from` to `to` with the archived flag set to `archived`, then
    /// delete `from`. A failed delete removes the copy again.
    async fn relocate(&self, from: &str, to: &str, archived: bool) -> Result<Document> {
        let mut doc = self.read_document(from).await?;
        let sha = doc.require_sha()?.to_string();
        doc.frontmatter.get_or_insert_with(Frontmatter::default).is_archived = Some(archived);
        let blob = doc.to_blob()?;

        let verb = if archived { "Archive" } else { "Unarchive" };
        let name = filename::basename(from);
        let created = self.create(to, &blob, &format!("{verb} {name}")).await?;

        if let Err(e) = self
            .delete(from, &format!("{verb} {name}: remove original"), &sha)
            .await
        {
            warn!(from, to, error = %e, "could not remove original, rolling back copy");
            if let Err(rollback) = self
                .provider
                .delete(to, &format!("{verb} {name}: roll back"), &created.sha)
                .await
            {
                warn!(to, error = %rollback, "rollback failed, copy left in place");
            }
            return Err(e);
        }

        Document::from_blob(to, &blob, Some(created.sha))
    }
}
