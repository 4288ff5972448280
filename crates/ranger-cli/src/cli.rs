use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ranger_core::{RunMode, RunRequest, SlotFilter};
use ranger_observe::{LoggerError, LoggerFormat};

#[derive(Parser, Debug)]
#[command(
    name = "chrome-ranger",
    version,
    about = "Run a benchmark command across Chrome versions × git refs"
)]
pub struct Cli {
    /// Project directory holding chrome-ranger.yaml.
    #[arg(short = 'C', long = "project", global = true, default_value = ".")]
    pub project: PathBuf,

    /// Log filter directive, e.g. `info` or `ranger.core=debug,info`.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// text | json | journald
    #[arg(long, global = true, default_value = "text", value_parser = parse_log_format)]
    pub log_format: LoggerFormat,

    /// Show targets and timestamps in log lines.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a template chrome-ranger.yaml.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Execute the pending part of the matrix.
    Run(RunArgs),
    /// Show per-cell completion at the current shas.
    Status,
    /// Remove all worktrees.
    Clean,
    /// List published Chrome-for-Testing versions, newest first.
    ListChrome {
        /// Only the N most recent versions.
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
        latest: Option<u32>,
    },
    /// Manage the Chrome binary cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Remove all cached Chrome binaries.
    Clean,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Only these Chrome versions.
    #[arg(long = "chrome", num_args = 1.., value_name = "VERSION")]
    pub chrome: Vec<String>,

    /// Only these refs.
    #[arg(long = "refs", num_args = 1.., value_name = "REF")]
    pub refs: Vec<String>,

    /// Add N iterations after the highest recorded one per cell.
    #[arg(long, value_name = "N", conflicts_with = "replace", value_parser = clap::value_parser!(u32).range(1..))]
    pub append: Option<u32>,

    /// Delete the targeted cells' records and run them again.
    #[arg(long)]
    pub replace: bool,
}

impl RunArgs {
    pub fn request(&self) -> RunRequest {
        let mode = match (self.append, self.replace) {
            (Some(n), _) => RunMode::Append(n),
            (None, true) => RunMode::Replace,
            (None, false) => RunMode::Resume,
        };
        let filter = SlotFilter::new(Some(self.chrome.clone()), Some(self.refs.clone()));
        RunRequest::new(mode, filter)
    }
}

fn parse_log_format(s: &str) -> Result<LoggerFormat, LoggerError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn plain_run_resumes_everything() {
        let req = run_args(&["chrome-ranger", "run"]).request();
        assert_eq!(req.mode, RunMode::Resume);
        assert!(req.filter.is_empty());
    }

    #[test]
    fn filters_and_modes() {
        let req = run_args(&["chrome-ranger", "run", "--chrome", "120", "121", "--refs", "main", "--append", "3"]).request();
        assert_eq!(req.mode, RunMode::Append(3));
        assert_eq!(req.filter.versions, Some(vec!["120".to_string(), "121".to_string()]));
        assert_eq!(req.filter.revisions, Some(vec!["main".to_string()]));

        let req = run_args(&["chrome-ranger", "run", "--replace"]).request();
        assert_eq!(req.mode, RunMode::Replace);
    }

    #[test]
    fn append_and_replace_are_exclusive() {
        assert!(Cli::try_parse_from(["chrome-ranger", "run", "--append", "2", "--replace"]).is_err());
        assert!(Cli::try_parse_from(["chrome-ranger", "run", "--append", "0"]).is_err());
    }

    #[test]
    fn global_flags() {
        let cli = Cli::try_parse_from(["chrome-ranger", "status", "-C", "/tmp/p", "--log-format", "json"]).unwrap();
        assert_eq!(cli.project, PathBuf::from("/tmp/p"));
        assert_eq!(cli.log_format, LoggerFormat::Json);
        assert!(Cli::try_parse_from(["chrome-ranger", "status", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn chrome_subcommands() {
        let cli = Cli::try_parse_from(["chrome-ranger", "list-chrome", "--latest", "5"]).unwrap();
        assert!(matches!(cli.command, Command::ListChrome { latest: Some(5) }));
        assert!(Cli::try_parse_from(["chrome-ranger", "list-chrome", "--latest", "0"]).is_err());

        let cli = Cli::try_parse_from(["chrome-ranger", "cache", "clean"]).unwrap();
        assert!(matches!(cli.command, Command::Cache { action: CacheCommand::Clean }));
        assert!(Cli::try_parse_from(["chrome-ranger", "cache"]).is_err());
    }
}
