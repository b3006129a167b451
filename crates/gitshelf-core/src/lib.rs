//! # gitshelf core
//!
//! Runtime-free logic for gitshelf: the document model, the filename
//! metadata codec, the frontmatter serializer, the error taxonomy, and the
//! [`provider::Provider`] capability trait with an in-memory implementation.
//!
//! This crate contains no tokio, reqwest, or other I/O dependencies. HTTP
//! adapters for GitHub and GitLab live in the `gitshelf` crate.

pub mod error;
pub mod filename;
pub mod frontmatter;
pub mod models;
pub mod provider;

pub use error::{ErrorKind, StoreError};
pub use models::{Document, ProviderKind, ProviderSettings};
pub use provider::Provider;
