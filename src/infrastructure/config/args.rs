use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "webimage",
    version,
    about = "Inspect and exercise the webimage cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load an image through memory, disk and network.
    Fetch {
        /// Image URL.
        url: String,

        /// Skip both cache tiers.
        #[arg(long)]
        bypass_cache: bool,

        /// Retry a URL that failed before.
        #[arg(long)]
        retry_failed: bool,

        /// Do not write the result to disk.
        #[arg(long)]
        memory_only: bool,

        /// Write the image bytes to this file. Without an extension, one
        /// matching the image format is added.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Apply the retention policy to the disk cache.
    Sweep,

    /// Print disk cache statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete every entry in the disk cache.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let args = CliArgs::parse_from([
            "webimage",
            "--log-level",
            "debug",
            "fetch",
            "https://x/a.png",
            "--memory-only",
            "-o",
            "out.png",
        ]);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        let Command::Fetch {
            url,
            memory_only,
            bypass_cache,
            output,
            ..
        } = args.command
        else {
            panic!("expected fetch");
        };
        assert_eq!(url, "https://x/a.png");
        assert!(memory_only);
        assert!(!bypass_cache);
        assert_eq!(output, Some(PathBuf::from("out.png")));
    }

    #[test]
    fn test_parse_stats_json() {
        let args = CliArgs::parse_from(["webimage", "stats", "--json"]);
        assert!(matches!(args.command, Command::Stats { json: true }));
    }
}
