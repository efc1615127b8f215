//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Activity archive to Parquet transform
#[derive(Parser, Debug)]
#[command(name = "ghactivity-transform")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML); defaults plus environment when omitted
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage location, overrides the config file and BUCKET_NAME
    /// Supports: /path, memory://, s3://bucket, gs://bucket, az://container
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform landed archives, e.g. 2024-03-15-9.json.gz
    Run {
        /// Archive file names under the landing directory
        #[arg(required = true)]
        file_names: Vec<String>,
    },

    /// Transform the archives announced by an object-created notification
    Trigger {
        /// Notification document path, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },

    /// Show the bookmark of a job
    Bookmark {
        /// Job id (defaults to the configured job)
        #[arg(long)]
        job: Option<String>,
    },

    /// Show the run audit of a job
    Runs {
        /// Job id (defaults to the configured job)
        #[arg(long)]
        job: Option<String>,
    },

    /// Print the records of a local Parquet file as JSON lines
    Inspect {
        /// Parquet file
        path: PathBuf,

        /// Maximum records to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start HTTP server mode
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one document per line)
    Json,
    /// Indented JSON
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "ghactivity-transform",
            "--bucket",
            "memory://",
            "run",
            "2024-03-15-9.json.gz",
            "2024-03-15-10.json.gz",
        ]);
        assert_eq!(cli.bucket.as_deref(), Some("memory://"));
        match cli.command {
            Commands::Run { file_names } => assert_eq!(file_names.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_file_name() {
        assert!(Cli::try_parse_from(["ghactivity-transform", "run"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["ghactivity-transform", "runs", "--format", "pretty", "-C", "p.yaml"]);
        assert_eq!(cli.format, OutputFormat::Pretty);
        assert_eq!(cli.config, Some(PathBuf::from("p.yaml")));
    }

    #[test]
    fn test_trigger_defaults_to_stdin() {
        let cli = Cli::parse_from(["ghactivity-transform", "trigger"]);
        assert!(matches!(cli.command, Commands::Trigger { ref event } if event == "-"));
    }
}
