//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Process command arguments.
#[derive(Debug, Args)]
pub struct ProcessCommand {
    /// Flight file, or directory of flight files
    pub path: PathBuf,

    /// Fleet that owns the upload
    #[arg(long, default_value = "0")]
    pub fleet_id: i64,

    /// User who uploaded the files
    #[arg(long, default_value = "0")]
    pub uploader_id: i64,

    /// Upload the files belong to
    #[arg(long, default_value = "0")]
    pub upload_id: i64,

    /// Store flights in the configured database
    #[arg(long)]
    pub store: bool,

    /// Write files derived while parsing into this directory
    #[arg(long, value_name = "DIR")]
    pub derived_dir: Option<PathBuf>,

    /// Output the run report as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Terrain lookup arguments.
#[derive(Debug, Args)]
pub struct TerrainCommand {
    /// Latitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lon: f64,

    /// Altitude above mean sea level in feet
    #[arg(allow_negative_numbers = true)]
    pub msl: f64,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
