//! Provider capability interface.
//!
//! The [`Provider`] trait is the one contract both hosting adapters (GitHub,
//! GitLab) and the in-memory provider implement. Every method returns the
//! shared [`StoreError`](crate::error::StoreError) taxonomy regardless of the
//! provider's own status codes or payload shapes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_file`](Provider::get_file) | Raw content plus sha |
//! | [`get_file_metadata`](Provider::get_file_metadata) | Sha, path, name, and content before a write |
//! | [`create_or_update`](Provider::create_or_update) | Create (no sha) or update (expected sha) |
//! | [`delete`](Provider::delete) | Delete with the current sha |
//! | [`list_page`](Provider::list_page) | One page of a folder listing |
//! | [`list`](Provider::list) | Lazy stream of documents in a folder |
//! | [`history`](Provider::history) | Commits touching a path, newest first |
//! | [`at_commit`](Provider::at_commit) | Content of a path at a commit |
//! | [`list_folders`](Provider::list_folders) | Top-level folder names |
//! | [`ensure_directory`](Provider::ensure_directory) | Create a placeholder if the folder is empty |

pub mod memory;

use std::collections::{BTreeSet, VecDeque};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{Result, StoreError};
use crate::models::{
    join_path, CommitInfo, Document, EntryKind, FileContent, FileMetadata, Page, ProviderKind,
    TreeEntry, WriteResult, ARCHIVE_DIR, PLACEHOLDER_FILE,
};

/// Lazy, finite stream of documents; a fresh [`Provider::list`] call re-lists.
pub type DocumentStream<'a> = BoxStream<'a, Result<Document>>;

/// A Git hosting backend holding task documents.
///
/// Implementations hold their settings and transport; every call is a
/// single-flight request/response with no state shared between calls.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Read a file's raw content and current sha.
    async fn get_file(&self, path: &str) -> Result<FileContent>;

    /// Read what a writer needs: current sha plus content.
    async fn get_file_metadata(&self, path: &str) -> Result<FileMetadata>;

    /// Commit `content` to `path`.
    ///
    /// `expected_sha: None` creates a new file; `Some` updates and fails with
    /// a conflict when it no longer matches the provider's current value.
    async fn create_or_update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected_sha: Option<&str>,
    ) -> Result<WriteResult>;

    /// Delete `path`, which must still be at `sha`.
    async fn delete(&self, path: &str, message: &str, sha: &str) -> Result<()>;

    /// Fetch one page of the direct children of `folder`.
    ///
    /// `cursor` is `None` for the first page, then the `next` value of the
    /// previous page.
    async fn list_page(&self, folder: &str, cursor: Option<&str>) -> Result<Page>;

    /// Commits touching `path`, most recent first.
    async fn history(&self, path: &str) -> Result<Vec<CommitInfo>>;

    /// Content of `path` as of `commit`.
    async fn at_commit(&self, path: &str, commit: &str) -> Result<FileContent>;

    /// Names of top-level folders, hidden folders excluded.
    async fn list_folders(&self) -> Result<BTreeSet<String>>;

    /// Create a placeholder in `folder` if, and only if, it is empty or absent.
    async fn ensure_directory(&self, folder: &str) -> Result<()>;

    /// Stream the markdown documents of `folder`.
    ///
    /// Pages are fetched and files read only as the stream is polled. With
    /// `include_archived`, the folder's archive subtree follows; a missing
    /// archive subtree counts as empty. A failing file yields an `Err` item
    /// and the stream carries on with the next one.
    fn list<'a>(&'a self, folder: &'a str, include_archived: bool) -> DocumentStream<'a> {
        let listing = Listing::new(folder, include_archived);
        stream::unfold((self, listing), |(provider, mut listing)| async move {
            let item = listing.next_document(provider).await?;
            Some((item, (provider, listing)))
        })
        .boxed()
    }

    /// Collect [`list`](Provider::list), failing on the first bad item.
    async fn list_all(&self, folder: &str, include_archived: bool) -> Result<Vec<Document>> {
        self.list(folder, include_archived).try_collect().await
    }
}

/// Top-level folder names derived from a root listing, hidden folders excluded.
///
/// Shared by adapters whose provider has no dedicated folder endpoint.
pub async fn top_level_folders<P>(provider: &P) -> Result<BTreeSet<String>>
where
    P: Provider + ?Sized,
{
    let mut folders = BTreeSet::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = provider.list_page("", cursor.as_deref()).await?;
        folders.extend(
            page.entries
                .into_iter()
                .filter(|e| e.kind == EntryKind::Dir && !e.name.starts_with('.'))
                .map(|e| e.name),
        );
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(folders),
        }
    }
}

/// Create `<folder>/.gitkeep` when `folder` is absent or empty.
///
/// Idempotent: a placeholder created concurrently by someone else (a create
/// conflict) counts as success.
pub async fn ensure_placeholder<P>(provider: &P, folder: &str) -> Result<()>
where
    P: Provider + ?Sized,
{
    let folder = folder.trim_matches('/');
    match provider.list_page(folder, None).await {
        Ok(page) if !page.entries.is_empty() => return Ok(()),
        Ok(_) | Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e),
    }

    let placeholder = join_path(folder, PLACEHOLDER_FILE);
    let message = format!("Create folder {folder}");
    match provider
        .create_or_update(&placeholder, "", &message, None)
        .await
    {
        Ok(_) | Err(StoreError::Conflict { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Paging state behind [`Provider::list`].
struct Listing {
    /// Folders still to walk; `true` marks a folder that may be absent.
    folders: VecDeque<(String, bool)>,
    cursor: Cursor,
    pending: VecDeque<TreeEntry>,
}

impl Listing {
    fn new(folder: &str, include_archived: bool) -> Self {
        let mut folders = VecDeque::from([(folder.trim_matches('/').to_string(), false)]);
        if include_archived {
            folders.push_back((join_path(folder, ARCHIVE_DIR), true));
        }
        Self {
            folders,
            cursor: Cursor::Start,
            pending: VecDeque::new(),
        }
    }

    async fn next_document<P>(&mut self, provider: &P) -> Option<Result<Document>>
    where
        P: Provider + ?Sized,
    {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                let doc = provider.get_file(&entry.path).await.and_then(|file| {
                    Document::from_blob(&entry.path, &file.content, Some(file.sha))
                });
                return Some(doc);
            }

            let (folder, optional) = self.folders.front().cloned()?;
            let cursor = match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Done => {
                    self.folders.pop_front();
                    self.cursor = Cursor::Start;
                    continue;
                }
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };

            match provider.list_page(&folder, cursor.as_deref()).await {
                Ok(page) => {
                    self.pending
                        .extend(page.entries.into_iter().filter(TreeEntry::is_document));
                    self.cursor = page.next.map_or(Cursor::Done, Cursor::Next);
                }
                Err(StoreError::NotFound { .. }) if optional => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
