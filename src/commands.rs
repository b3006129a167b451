//! CLI command implementations.
//!
//! Each `run_*` function backs one `shelf` subcommand: it calls the
//! [`DocumentStore`] and prints a plain-text report to stdout. Store errors
//! propagate to `main`, which prints them and exits non-zero.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use gitshelf_core::filename::{PRIORITY_MAX, PRIORITY_MIN};
use gitshelf_core::models::{sort_documents, Document};
use tracing::warn;

use crate::config::Config;
use crate::store::{with_provider, DocumentStore, NewTask};
use crate::transport::ReqwestTransport;
use crate::writer::RetryPolicy;

/// Build the store described by `config` over a real HTTP client.
pub fn open_store(config: &Config) -> Result<DocumentStore> {
    let settings = config.provider.to_settings()?;
    let transport = ReqwestTransport::new(&config.http)?;
    let store = with_provider(&settings, Arc::new(transport))
        .with_context(|| format!("cannot use {} provider", settings.kind()))?;
    Ok(store.with_retry(RetryPolicy::from(&config.retry)))
}

pub async fn run_folders(store: &DocumentStore) -> Result<()> {
    let folders = store.list_folders().await?;
    if folders.is_empty() {
        println!("No folders.");
    }
    for folder in folders {
        println!("{}", folder);
    }
    Ok(())
}

pub async fn run_list(store: &DocumentStore, folder: &str, archived: bool) -> Result<()> {
    let mut docs = Vec::new();
    let mut failed = 0usize;
    let mut stream = store.list_documents(folder, archived);
    while let Some(item) = stream.next().await {
        match item {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                failed += 1;
                warn!(folder, error = %e, "skipping unreadable document");
            }
        }
    }
    sort_documents(&mut docs);

    if docs.is_empty() {
        println!("No documents in {}.", folder);
    }
    for doc in &docs {
        println!("{}", summary_line(doc));
    }
    if failed > 0 {
        println!();
        println!("{} document(s) could not be read", failed);
    }
    Ok(())
}

pub async fn run_show(store: &DocumentStore, path: &str, at: Option<&str>) -> Result<()> {
    let doc = match at {
        Some(commit) => {
            let file = store.at_commit(path, commit).await?;
            Document::from_blob(path, &file.content, Some(file.sha))?
        }
        None => store.read_document(path).await?,
    };

    println!("--- Document ---");
    println!("path:      {}", doc.path);
    println!("title:     {}", doc.title);
    if let Some(priority) = doc.priority() {
        println!("priority:  P{}", priority);
    }
    if let Some(date) = doc.created_date() {
        println!("created:   {}", date);
    }
    println!("archived:  {}", doc.is_archived());
    if let Some(sha) = &doc.sha {
        println!("sha:       {}", sha);
    }
    if let Some(history) = doc
        .frontmatter
        .as_ref()
        .and_then(|fm| fm.chat_history.as_ref())
    {
        println!("chat:      {} message(s)", history.len());
    }
    println!();

    println!("--- Body ---");
    println!("{}", doc.content);
    Ok(())
}

pub async fn run_new(
    store: &DocumentStore,
    folder: &str,
    title: &str,
    priority: u8,
    body: Option<&str>,
) -> Result<()> {
    check_priority(priority)?;
    let mut task = NewTask::new(title).priority(priority);
    if let Some(body) = body {
        task = task.body(body);
    }
    let doc = store.create_task(folder, task).await?;
    println!("Created {}", doc.path);
    Ok(())
}

pub async fn run_rename(store: &DocumentStore, path: &str, title: &str) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let doc = store.rename_title(path, title).await?;
    println!("Renamed {} to \"{}\"", doc.path, doc.title);
    Ok(())
}

pub async fn run_priority(store: &DocumentStore, path: &str, priority: u8) -> Result<()> {
    check_priority(priority)?;
    let doc = store.set_priority(path, priority).await?;
    println!("Set {} to P{}", doc.path, priority);
    Ok(())
}

pub async fn run_archive(store: &DocumentStore, path: &str) -> Result<()> {
    let doc = store.archive(path).await?;
    println!("Archived {} -> {}", path, doc.path);
    Ok(())
}

pub async fn run_unarchive(store: &DocumentStore, path: &str) -> Result<()> {
    let doc = store.unarchive(path).await?;
    println!("Restored {} -> {}", path, doc.path);
    Ok(())
}

pub async fn run_delete(store: &DocumentStore, path: &str) -> Result<()> {
    let doc = store.read_document(path).await?;
    let sha = doc.require_sha()?;
    store
        .delete(path, &format!("Delete {}", doc.name), sha)
        .await?;
    println!("Deleted {}", path);
    Ok(())
}

pub async fn run_history(store: &DocumentStore, path: &str) -> Result<()> {
    let commits = store.history(path).await?;
    if commits.is_empty() {
        println!("No history for {}.", path);
    }
    for commit in commits {
        let short = commit.sha.get(..8).unwrap_or(&commit.sha);
        let subject = commit.message.lines().next().unwrap_or_default();
        println!(
            "{}  {}  {:<20}  {}",
            short,
            commit.date.format("%Y-%m-%d %H:%M"),
            commit.author_name,
            subject
        );
    }
    Ok(())
}

pub async fn run_init(store: &DocumentStore, folder: &str) -> Result<()> {
    store.ensure_directory(folder).await?;
    println!("Folder {} is ready.", folder);
    Ok(())
}

fn check_priority(priority: u8) -> Result<()> {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        bail!(
            "priority must be between {} and {}, got {}",
            PRIORITY_MIN,
            PRIORITY_MAX,
            priority
        );
    }
    Ok(())
}

fn summary_line(doc: &Document) -> String {
    let priority = doc
        .priority()
        .map_or_else(|| "--".to_string(), |p| format!("P{}", p));
    let date = doc
        .created_date()
        .map_or_else(|| "----------".to_string(), |d| d.to_string());
    let archived = if doc.is_archived() { " [archived]" } else { "" };
    format!("{}  {}  {}{}  ({})", priority, date, doc.title, archived, doc.path)
}
