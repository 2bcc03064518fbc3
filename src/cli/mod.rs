//! CLI command definitions and handlers

use clap::{Args, Parser, Subcommand};
pub use clap_complete::Shell;

use crate::client::Resource;

pub mod access;
pub mod args;
pub mod auth;
pub mod cache;
pub mod completions;
pub mod context;
pub mod data;
pub mod init;
pub mod queue;
pub mod status;

pub use args::{OutputFormat, WriteArgs};
pub use context::CommandContext;

/// EduReg - resilient command-line client for the education registry
#[derive(Parser, Debug)]
#[command(name = "edureg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "EDUREG_FORMAT",
        default_value = "table",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "EDUREG_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override durable storage directory (session, queue, cache)
    #[arg(long, global = true, env = "EDUREG_DATA_DIR", hide_env = true)]
    pub data_dir: Option<String>,

    /// Override the registry platform URL
    #[arg(long, global = true, env = "EDUREG_API_URL", hide_env = true)]
    pub api_url: Option<String>,

    /// Work offline: serve reads from cache and queue writes
    #[arg(long, global = true, env = "EDUREG_OFFLINE", hide_env = true)]
    pub offline: bool,

    /// Bypass cache, fetch fresh data from the platform
    #[arg(long, global = true, env = "EDUREG_NO_CACHE", hide_env = true)]
    pub no_cache: bool,

    /// Enable debug logging
    #[arg(long, global = true, env = "EDUREG_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize EduReg configuration
    Init,

    /// Sign in to the registry platform
    Login {
        /// Account email (prompted when omitted)
        #[arg(long, short = 'e')]
        email: Option<String>,
    },

    /// Sign out and drop queued writes tied to this session
    Logout,

    /// Show configuration, session, connectivity and queue status
    Status,

    /// Display version information
    Version,

    /// List rows of a registry resource
    #[command(after_help = "\
Examples:
  edureg list schools --filter sector_id=12
  edureg list regions --format json
  edureg --offline list sectors")]
    List(ListArgs),

    /// Show one row of a registry resource
    Get {
        /// Resource name (regions, sectors, schools, users, ...)
        resource: Resource,
        /// Row id
        id: String,
    },

    /// Create a row (queued when offline)
    Create {
        resource: Resource,
        #[command(flatten)]
        write: WriteArgs,
    },

    /// Update a row (queued when offline)
    Update {
        resource: Resource,
        /// Row id
        id: String,
        #[command(flatten)]
        write: WriteArgs,
    },

    /// Delete a row (queued when offline)
    Delete {
        resource: Resource,
        /// Row id
        id: String,
        /// Fail instead of queueing when the platform is unreachable
        #[arg(long)]
        no_queue: bool,
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Inspect and replay writes waiting for connectivity
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Manage the local response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Check whether the current session may open a view
    Access {
        /// View name or path, e.g. `/schools/42`; omit to check every view
        view: Option<String>,
    },

    /// Generate shell completions
    #[command(after_help = "\
Examples:
  bash:   edureg completion bash > /etc/bash_completion.d/edureg
  zsh:    edureg completion zsh > \"${fpath[1]}/_edureg\"
  fish:   edureg completion fish > ~/.config/fish/completions/edureg.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for `list`
#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Resource name (regions, sectors, schools, users, ...)
    pub resource: Resource,

    /// Equality filter `column=value` (repeatable)
    #[arg(long = "filter", short = 'f', value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Maximum rows to return
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Do not narrow results to your region, sector or school
    #[arg(long)]
    pub all_scopes: bool,
}

/// Offline queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List queued writes, oldest first
    List,
    /// Replay queued writes now
    Drain,
    /// Keep running and replay queued writes whenever the platform is reachable
    Watch {
        /// Seconds between connectivity checks
        #[arg(long, default_value_t = 15)]
        interval: u64,
    },
    /// Discard every queued write
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,
    /// Clear all cached data
    Clear,
    /// Print the durable store path
    Path,
}

fn parse_filter(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected column=value, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("sector_id=12").unwrap(),
            ("sector_id".to_string(), "12".to_string())
        );
        assert!(parse_filter("sector_id").is_err());
        assert!(parse_filter("=12").is_err());
    }

    #[test]
    fn test_list_args() {
        let cli = Cli::parse_from([
            "edureg", "list", "schools", "-f", "sector_id=3", "--limit", "5",
        ]);
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.resource, Resource::Schools);
                assert_eq!(args.filters.len(), 1);
                assert_eq!(args.limit, Some(5));
                assert!(!args.all_scopes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_resource_rejected() {
        assert!(Cli::try_parse_from(["edureg", "list", "teams"]).is_err());
    }
}
