//! # gitshelf CLI (`shelf`)
//!
//! The `shelf` binary manages markdown task files stored in a GitHub
//! repository or a GitLab project. Every change is a commit on the
//! configured branch.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf folders` | List top-level folders |
//! | `shelf list [FOLDER]` | List tasks sorted by priority and date |
//! | `shelf show PATH` | Print a task, optionally as of a commit |
//! | `shelf new TITLE` | Create a task |
//! | `shelf rename PATH TITLE` | Change a task's title |
//! | `shelf priority PATH N` | Change a task's priority |
//! | `shelf archive PATH` | Move a task into the archive |
//! | `shelf unarchive PATH` | Move a task out of the archive |
//! | `shelf delete PATH` | Delete a task |
//! | `shelf history PATH` | Show the commits touching a task |
//! | `shelf init [FOLDER]` | Create a folder placeholder if needed |
//!
//! Logging goes to stderr; set `RUST_LOG=debug` to see every provider request.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitshelf::{commands, config};
use gitshelf_core::filename::DEFAULT_PRIORITY;
use tracing_subscriber::EnvFilter;

/// gitshelf: markdown tasks in a Git repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Manage markdown task files stored in a GitHub or GitLab repository",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List top-level folders of the repository.
    Folders,

    /// List the tasks of a folder.
    List {
        /// Folder to list; defaults to `[store].folder`.
        folder: Option<String>,

        /// Include the folder's archive.
        #[arg(long)]
        archived: bool,
    },

    /// Print one task.
    Show {
        path: String,

        /// Show the task as of this commit.
        #[arg(long)]
        at: Option<String>,
    },

    /// Create a task.
    New {
        title: String,

        /// Folder to create the task in; defaults to `[store].folder`.
        #[arg(long)]
        folder: Option<String>,

        /// Priority from 1 (most urgent) to 5.
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: u8,

        /// Markdown body.
        #[arg(long)]
        body: Option<String>,
    },

    /// Change the title of a task.
    Rename { path: String, title: String },

    /// Change the priority of a task.
    Priority { path: String, priority: u8 },

    /// Move a task into its folder's archive.
    Archive { path: String },

    /// Move an archived task back into its folder.
    Unarchive { path: String },

    /// Delete a task.
    Delete { path: String },

    /// Show the commits touching a task, newest first.
    History { path: String },

    /// Create a folder placeholder if the folder is empty or missing.
    Init {
        /// Folder to prepare; defaults to `[store].folder`.
        folder: Option<String>,
    },
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    install_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;
    let store = commands::open_store(&cfg)?;
    let default_folder = cfg.store.folder.as_str();

    match cli.command {
        Commands::Folders => commands::run_folders(&store).await?,
        Commands::List { folder, archived } => {
            let folder = folder.as_deref().unwrap_or(default_folder);
            commands::run_list(&store, folder, archived).await?;
        }
        Commands::Show { path, at } => {
            commands::run_show(&store, &path, at.as_deref()).await?;
        }
        Commands::New {
            title,
            folder,
            priority,
            body,
        } => {
            let folder = folder.as_deref().unwrap_or(default_folder);
            commands::run_new(&store, folder, &title, priority, body.as_deref()).await?;
        }
        Commands::Rename { path, title } => commands::run_rename(&store, &path, &title).await?,
        Commands::Priority { path, priority } => {
            commands::run_priority(&store, &path, priority).await?;
        }
        Commands::Archive { path } => commands::run_archive(&store, &path).await?,
        Commands::Unarchive { path } => commands::run_unarchive(&store, &path).await?,
        Commands::Delete { path } => commands::run_delete(&store, &path).await?,
        Commands::History { path } => commands::run_history(&store, &path).await?,
        Commands::Init { folder } => {
            let folder = folder.as_deref().unwrap_or(default_folder);
            commands::run_init(&store, folder).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new_command() {
        let cli = Cli::try_parse_from(["shelf", "new", "Fix login", "--priority", "2"]).unwrap();
        match cli.command {
            Commands::New {
                title,
                priority,
                folder,
                ..
            } => {
                assert_eq!(title, "Fix login");
                assert_eq!(priority, 2);
                assert!(folder.is_none());
            }
            _ => panic!("expected new"),
        }
        assert_eq!(cli.config, PathBuf::from("./config/shelf.toml"));
    }

    #[test]
    fn test_parse_show_at_commit() {
        let cli = Cli::try_parse_from(["shelf", "show", "tasks/a.md", "--at", "abc123"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Show { ref path, at: Some(ref at) } if path == "tasks/a.md" && at == "abc123"
        ));
    }

    #[test]
    fn test_list_defaults() {
        let cli = Cli::try_parse_from(["shelf", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                folder: None,
                archived: false
            }
        ));
    }
}
