//! In-memory [`Provider`] for tests and offline runs.
//!
//! Files live in a `BTreeMap` behind a `Mutex`. Shas are hex SHA-256 digests
//! of the content, so a write carrying a stale sha is rejected exactly like a
//! hosting provider would. Every mutation is recorded as a commit, which
//! backs [`Provider::history`] and [`Provider::at_commit`].
//!
//! [`MemoryProvider::simulate_concurrent_writes`] lets tests stage another
//! writer committing just before each of the next N updates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::filename;
use crate::models::{
    join_path, CommitInfo, EntryKind, FileContent, FileMetadata, Page, ProviderKind, TreeEntry,
    WriteResult,
};

use super::{ensure_placeholder, top_level_folders, Provider};

const DEFAULT_PAGE_SIZE: usize = 100;

type ConcurrentEdit = Box<dyn Fn(&str) -> String + Send + Sync>;

struct Commit {
    sha: String,
    message: String,
    path: String,
    /// Content after the commit; `None` for a deletion.
    content: Option<String>,
    sequence: i64,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, String>,
    commits: Vec<Commit>,
    pending_edits: usize,
    edit: Option<ConcurrentEdit>,
}

/// In-memory provider keyed by repository path.
pub struct MemoryProvider {
    kind: ProviderKind,
    page_size: usize,
    state: Mutex<State>,
    calls: AtomicUsize,
    write_attempts: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            kind: ProviderKind::GitHub,
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State::default()),
            calls: AtomicUsize::new(0),
            write_attempts: AtomicUsize::new(0),
        }
    }

    /// Report `kind` from [`Provider::kind`].
    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Split folder listings into pages of `size` entries.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Seed a file without counting it as a call.
    pub fn insert(&self, path: &str, content: &str) -> String {
        let mut state = self.lock();
        commit(&mut state, path, Some(content.to_string()), "seed");
        content_sha(content)
    }

    /// Current content of `path`, bypassing call accounting.
    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Before each of the next `count` updates, commit `edit(current)` to the
    /// target path as another writer would, making the update's sha stale.
    pub fn simulate_concurrent_writes<F>(&self, count: usize, edit: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.pending_edits = count;
        state.edit = Some(Box::new(edit));
    }

    /// Number of provider calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `create_or_update` calls made so far.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn content_sha(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn commit(state: &mut State, path: &str, content: Option<String>, message: &str) -> String {
    let sequence = state.commits.len() as i64;
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(path.as_bytes());
    hasher.update(message.as_bytes());
    if let Some(content) = &content {
        hasher.update(content.as_bytes());
    }
    let sha = hex::encode(hasher.finalize());

    match &content {
        Some(content) => {
            state.files.insert(path.to_string(), content.clone());
        }
        None => {
            state.files.remove(path);
        }
    }
    state.commits.push(Commit {
        sha: sha.clone(),
        message: message.to_string(),
        path: path.to_string(),
        content,
        sequence,
    });
    sha
}

#[async_trait]
impl Provider for MemoryProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn get_file(&self, path: &str) -> Result<FileContent> {
        self.record_call();
        let state = self.lock();
        let content = state
            .files
            .get(path)
            .ok_or_else(|| StoreError::not_found(path))?;
        Ok(FileContent {
            content: content.clone(),
            sha: content_sha(content),
        })
    }

    async fn get_file_metadata(&self, path: &str) -> Result<FileMetadata> {
        let file = self.get_file(path).await?;
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
        self.record_call();
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if expected_sha.is_some() && state.pending_edits > 0 {
            if let Some(current) = state.files.get(path).cloned() {
                let edited = state.edit.as_ref().map(|edit| edit(&current));
                if let Some(edited) = edited {
                    state.pending_edits -= 1;
                    commit(&mut state, path, Some(edited), "concurrent edit");
                }
            }
        }

        match (expected_sha, state.files.get(path)) {
            (None, Some(_)) => {
                return Err(StoreError::conflict(path, "file already exists"));
            }
            (Some(_), None) => return Err(StoreError::not_found(path)),
            (Some(expected), Some(current)) if content_sha(current) != expected => {
                return Err(StoreError::conflict(path, "sha does not match"));
            }
            _ => {}
        }

        let commit_sha = commit(&mut state, path, Some(content.to_string()), message);
        Ok(WriteResult {
            sha: content_sha(content),
            commit_sha: Some(commit_sha),
        })
    }

    async fn delete(&self, path: &str, message: &str, sha: &str) -> Result<()> {
        self.record_call();
        let mut state = self.lock();
        let current = state
            .files
            .get(path)
            .ok_or_else(|| StoreError::not_found(path))?;
        if content_sha(current) != sha {
            return Err(StoreError::conflict(path, "sha does not match"));
        }
        commit(&mut state, path, None, message);
        Ok(())
    }

    async fn list_page(&self, folder: &str, cursor: Option<&str>) -> Result<Page> {
        self.record_call();
        let folder = folder.trim_matches('/');
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{}/", folder)
        };

        let state = self.lock();
        let mut entries = Vec::new();
        let mut dirs = BTreeSet::new();
        for path in state.files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if dirs.insert(dir.to_string()) {
                        entries.push(TreeEntry {
                            path: join_path(folder, dir),
                            name: dir.to_string(),
                            kind: EntryKind::Dir,
                        });
                    }
                }
                None => entries.push(TreeEntry {
                    path: path.clone(),
                    name: rest.to_string(),
                    kind: EntryKind::File,
                }),
            }
        }

        if entries.is_empty() && !folder.is_empty() {
            return Err(StoreError::not_found(folder));
        }

        let offset = match cursor {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StoreError::protocol("list cursor", token))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(entries.len());
        let next = (end < entries.len()).then(|| end.to_string());
        Ok(Page {
            entries: entries.get(offset..end).unwrap_or_default().to_vec(),
            next,
        })
    }

    async fn history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        self.record_call();
        let state = self.lock();
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        let commits: Vec<CommitInfo> = state
            .commits
            .iter()
            .rev()
            .filter(|c| c.path == path)
            .map(|c| CommitInfo {
                sha: c.sha.clone(),
                message: c.message.clone(),
                author_name: "memory".to_string(),
                author_email: None,
                date: epoch.unwrap_or_default() + Duration::minutes(c.sequence),
                url: None,
            })
            .collect();
        Ok(commits)
    }

    async fn at_commit(&self, path: &str, commit_ref: &str) -> Result<FileContent> {
        self.record_call();
        let state = self.lock();
        let position = state
            .commits
            .iter()
            .position(|c| c.sha == commit_ref)
            .ok_or_else(|| StoreError::not_found(format!("{path}@{commit_ref}")))?;
        state.commits[..=position]
            .iter()
            .rev()
            .find(|c| c.path == path)
            .and_then(|c| c.content.clone())
            .map(|content| FileContent {
                sha: content_sha(&content),
                content,
            })
            .ok_or_else(|| StoreError::not_found(format!("{path}@{commit_ref}")))
    }

    async fn list_folders(&self) -> Result<BTreeSet<String>> {
        top_level_folders(self).await
    }

    async fn ensure_directory(&self, folder: &str) -> Result<()> {
        ensure_placeholder(self, folder).await
    }
}
