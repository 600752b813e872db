//! Command-line interface for flightdata.
//!
//! This module provides the CLI structure for the `fdproc` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ProcessCommand, TerrainCommand};

/// fdproc - Turn raw flight-recorder files into flights
///
/// Parses delimited-text, binary-derived, GPX and JSON recordings, derives
/// additional columns and optionally stores the results.
#[derive(Debug, Parser)]
#[command(name = "fdproc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process flight files
    Process(ProcessCommand),

    /// Look up height above ground for a position
    Terrain(TerrainCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "fdproc");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;

        assert_eq!(parse(&["fdproc", "-q", "config", "path"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["fdproc", "config", "path"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["fdproc", "-v", "config", "path"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["fdproc", "-vvv", "config", "path"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_process() {
        let cli = parse(&[
            "fdproc",
            "process",
            "uploads/42",
            "--fleet-id",
            "7",
            "--upload-id",
            "42",
            "--store",
            "--derived-dir",
            "derived",
        ]);
        let Command::Process(cmd) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(cmd.path, PathBuf::from("uploads/42"));
        assert_eq!(cmd.fleet_id, 7);
        assert_eq!(cmd.uploader_id, 0);
        assert_eq!(cmd.upload_id, 42);
        assert!(cmd.store);
        assert_eq!(cmd.derived_dir, Some(PathBuf::from("derived")));
        assert!(!cmd.json);
    }

    #[test]
    fn test_parse_terrain_negative_longitude() {
        let cli = parse(&["fdproc", "terrain", "44.5", "-93.2", "1200"]);
        let Command::Terrain(cmd) = cli.command else {
            panic!("expected terrain command");
        };
        assert!((cmd.lon + 93.2).abs() < f64::EPSILON);
        assert!((cmd.msl - 1200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["fdproc", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["fdproc", "-c", "/custom/config.toml", "config", "show"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_process_requires_path() {
        assert!(Cli::try_parse_from(["fdproc", "process"]).is_err());
    }
}
