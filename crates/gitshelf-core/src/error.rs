//! Error taxonomy shared by every store operation.
//!
//! Each failure reaching a caller is exactly one [`StoreError`] variant.
//! Only [`StoreError::Conflict`] is retried, and only by the
//! conflict-resolving writer; everything else surfaces immediately.

use thiserror::Error;

/// Maximum number of characters of a raw provider body kept in
/// [`StoreError::Protocol`]'s display snippet.
pub const SNIPPET_LEN: usize = 200;

/// Errors produced by the document store, its adapters, and its codecs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Settings are incomplete or name an unsupported provider.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        /// Names of the required settings that were empty.
        missing: Vec<&'static str>,
    },

    /// The path does not exist on the configured branch.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The supplied sha is stale: someone else changed the document.
    #[error("someone else changed {path} since it was read ({detail})")]
    Conflict { path: String, detail: String },

    /// The provider answered, but not in the expected format.
    #[error("unexpected response from provider ({context}): {snippet}")]
    Protocol {
        context: String,
        snippet: String,
        body: String,
    },

    /// Network or HTTP failure below the application protocol.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// The frontmatter header of a document is malformed.
    #[error("malformed frontmatter: {message}")]
    Parse { message: String },
}

/// Discriminant of a [`StoreError`], for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    NotFound,
    Conflict,
    Protocol,
    Transport,
    Parse,
}

impl StoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    /// Settings error naming every missing field.
    pub fn missing_settings(provider: &str, missing: Vec<&'static str>) -> Self {
        Self::Config {
            message: format!(
                "{} settings are incomplete, missing: {}",
                provider,
                missing.join(", ")
            ),
            missing,
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn conflict(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Build a protocol error, keeping the whole body and a bounded snippet.
    pub fn protocol(context: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::Protocol {
            context: context.into(),
            snippet: truncate_snippet(&body),
            body,
        }
    }

    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Whether the conflict-resolving writer may retry after this error.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Truncate `body` to at most [`SNIPPET_LEN`] characters.
pub fn truncate_snippet(body: &str) -> String {
    match body.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
