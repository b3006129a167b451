//! Configuration parsing and validation.
//!
//! gitshelf is configured via a TOML file (default `./config/shelf.toml`).
//!
//! ```toml
//! [provider]
//! kind = "github"          # or "gitlab"
//! owner = "acme"
//! repo = "notes"
//! # pat = "ghp_..."        # or GITHUB_TOKEN
//! # branch = "main"        # default: the repository's default branch
//! # api_url = "https://ghe.example.com/api/v3"
//!
//! # kind = "gitlab"
//! # instance_url = "https://gitlab.com"
//! # project_id = 1234      # or "group/project"
//! # token = "glpat-..."    # or GITLAB_TOKEN
//! # branch = "main"
//!
//! [store]
//! folder = "tasks"
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 250
//!
//! [http]
//! timeout_secs = 30
//! ```
//!
//! Only `[provider].kind` is required by the loader. Whether the provider
//! settings are complete is checked when the store is built, so settings
//! assembled in code go through the same check.

use anyhow::{bail, Context, Result};
use gitshelf_core::models::{GitHubSettings, GitLabSettings, ProviderKind, ProviderSettings};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Environment variable consulted when `[provider].pat` is absent.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
/// Environment variable consulted when `[provider].token` is absent.
pub const GITLAB_TOKEN_ENV: &str = "GITLAB_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Raw `[provider]` table. Fields of the other provider kind are ignored.
#[derive(Deserialize, Clone, Default)]
pub struct ProviderConfig {
    pub kind: String,
    #[serde(default)]
    pub pat: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub instance_url: Option<String>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub token: Option<String>,
}

/// GitLab project reference: numeric id or `namespace/project` path.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProjectId {
    Number(u64),
    Path(String),
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("pat", &secret(&self.pat))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("instance_url", &self.instance_url)
            .field("project_id", &self.project_id)
            .field("token", &secret(&self.token))
            .finish()
    }
}

impl ProviderConfig {
    /// Convert into tagged settings, reading missing tokens from the environment.
    pub fn to_settings(&self) -> gitshelf_core::error::Result<ProviderSettings> {
        self.to_settings_with(|name| std::env::var(name).ok())
    }

    /// Like [`to_settings`](Self::to_settings) with an explicit variable lookup.
    pub fn to_settings_with<F>(&self, env: F) -> gitshelf_core::error::Result<ProviderSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let secret = |value: &Option<String>, var: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(var))
                .unwrap_or_default()
        };

        Ok(match ProviderKind::from_tag(&self.kind)? {
            ProviderKind::GitHub => ProviderSettings::GitHub(GitHubSettings {
                pat: secret(&self.pat, GITHUB_TOKEN_ENV),
                owner: text(&self.owner),
                repo: text(&self.repo),
                branch: self.branch.clone(),
                api_url: self.api_url.clone(),
            }),
            ProviderKind::GitLab => ProviderSettings::GitLab(GitLabSettings {
                instance_url: text(&self.instance_url),
                project_id: self
                    .project_id
                    .as_ref()
                    .map(ProjectId::to_string)
                    .unwrap_or_default(),
                token: secret(&self.token, GITLAB_TOKEN_ENV),
                branch: text(&self.branch),
            }),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Folder the CLI works in when none is given.
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
        }
    }
}

fn default_folder() -> String {
    "tasks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("gitshelf/{}", env!("CARGO_PKG_VERSION"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate provider
    if let Err(e) = ProviderKind::from_tag(&config.provider.kind) {
        bail!("provider.kind: {}. Must be github or gitlab.", e);
    }

    // Validate store
    if config.store.folder.split('/').any(|part| part == "..") {
        bail!("store.folder must not contain '..'");
    }

    // Validate retry
    if config.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be >= 1");
    }

    // Validate http
    if config.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be > 0");
    }

    Ok(config)
}
