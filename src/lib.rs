//! # gitshelf
//!
//! A Git-backed document store for markdown task files. The repository on
//! GitHub or GitLab is the only source of truth and its commit history is
//! the audit log; every write carries the provider's content hash so
//! concurrent editors never silently overwrite each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │  caller  │──▶│ Dispatcher │──▶│   Adapter    │──▶│ Transport │
//! │ CLI/lib  │   │  (store)   │   │ GitHub/GitLab│   │ (reqwest) │
//! └──────────┘   └─────┬──────┘   └──────────────┘   └───────────┘
//!                      │ updates
//!                      ▼
//!               ┌─────────────┐
//!               │   Writer    │  fetch sha ─▶ write ─▶ retry on conflict
//!               └─────────────┘
//! ```
//!
//! The filename codec, frontmatter serializer, error taxonomy and the
//! [`Provider`](gitshelf_core::Provider) trait live in `gitshelf-core`.
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                       # create tasks/.gitkeep if needed
//! shelf new "Renew TLS certs" --priority 2
//! shelf list
//! shelf rename tasks/P2--2024-03-09--renew-tls-certs.md "Renew TLS certificates"
//! shelf archive tasks/P2--2024-03-09--renew-tls-certs.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`transport`] | HTTP request/response collaborator |
//! | [`github`] | GitHub REST adapter |
//! | [`gitlab`] | GitLab REST adapter |
//! | [`store`] | Dispatcher and document operations |
//! | [`writer`] | Conflict-resolving writer |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod github;
pub mod gitlab;
pub mod store;
pub mod transport;
pub mod writer;

pub use store::{create_provider, with_provider, DocumentStore, NewTask};
pub use writer::{ConflictResolvingWriter, RetryPolicy, WriteOutcome, WriterState};
