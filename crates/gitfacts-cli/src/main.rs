//! gitfacts-cli: query git history and extracted facts with SQL.

mod commands_config;
mod commands_index;
mod commands_query;

use clap::{Parser, Subcommand, ValueEnum};
use gitfacts_core::GitfactsConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gitfacts",
    about = "SQL over git history and the facts extracted from its files"
)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL query against the `commits` and `facts` tables
    Query {
        /// SQL statement
        sql: String,

        /// Repository to query (defaults to the configured path or the current directory)
        #[arg(short, long)]
        repo: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// List registered scanners in dispatch order
    Scanners,

    /// Extract every file and fact of one commit as JSON
    Index {
        /// Repository to index (defaults to the configured path or the current directory)
        #[arg(short, long)]
        repo: Option<PathBuf>,

        /// Commit hash (defaults to HEAD)
        #[arg(short, long)]
        commit: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// One JSON object per row
    Json,
    /// Tab-separated values with a header line
    Tsv,
}

fn main() -> anyhow::Result<()> {
    let config = GitfactsConfig::load_or_default();

    // stdout carries query results only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.logging.filter.parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query { sql, repo, format } => {
            let repo = repo_path(&config, repo)?;
            commands_query::cmd_query(&config, &repo, &sql, format)?;
        }
        Commands::Scanners => {
            commands_index::cmd_scanners(&config)?;
        }
        Commands::Index { repo, commit } => {
            let repo = repo_path(&config, repo)?;
            commands_index::cmd_index(&config, &repo, commit.as_deref())?;
        }
        Commands::Config { init } => {
            commands_config::cmd_config(&config, init)?;
        }
    }

    Ok(())
}

// ── Helpers (shared across modules) ────────────────────────────────────────

/// An explicit `--repo` wins over the configured repository.
pub(crate) fn repo_path(config: &GitfactsConfig, explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(config.repository.resolve()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_query_command() {
        let cli = Cli::try_parse_from(["gitfacts", "query", "SELECT * FROM commits"]).unwrap();
        match cli.command {
            Commands::Query { sql, repo, format } => {
                assert_eq!(sql, "SELECT * FROM commits");
                assert!(repo.is_none());
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn parse_query_with_options() {
        let cli = Cli::try_parse_from([
            "gitfacts",
            "query",
            "SELECT 1",
            "--repo",
            "/tmp/repo",
            "--format",
            "tsv",
        ])
        .unwrap();
        match cli.command {
            Commands::Query { repo, format, .. } => {
                assert_eq!(repo, Some(PathBuf::from("/tmp/repo")));
                assert_eq!(format, OutputFormat::Tsv);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn parse_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["gitfacts", "query", "SELECT 1", "--format", "xml"]).is_err());
    }

    #[test]
    fn parse_index_command() {
        let cli = Cli::try_parse_from(["gitfacts", "index", "-c", "abc"]).unwrap();
        match cli.command {
            Commands::Index { repo, commit } => {
                assert!(repo.is_none());
                assert_eq!(commit.as_deref(), Some("abc"));
            }
            _ => panic!("Expected Index command"),
        }
    }

    #[test]
    fn parse_scanners_and_config() {
        let cli = Cli::try_parse_from(["gitfacts", "scanners"]).unwrap();
        assert!(matches!(cli.command, Commands::Scanners));
        let cli = Cli::try_parse_from(["gitfacts", "config", "--init"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { init: true }));
    }

    #[test]
    fn explicit_repo_wins() {
        let mut config = GitfactsConfig::default();
        config.repository.path = Some(PathBuf::from("/configured"));
        assert_eq!(
            repo_path(&config, Some(PathBuf::from("/explicit"))).unwrap(),
            PathBuf::from("/explicit")
        );
        assert_eq!(repo_path(&config, None).unwrap(), PathBuf::from("/configured"));
    }
}
