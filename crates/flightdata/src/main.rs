//! `fdproc` - CLI for flightdata
//!
//! This binary processes flight-recorder files and inspects the terrain and
//! configuration the pipeline uses.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use flightdata::airframes::AirframeRegistry;
use flightdata::cli::{Cli, Command, ConfigCommand, ProcessCommand, TerrainCommand};
use flightdata::parse::{ParseContext, ParserRegistry};
use flightdata::pipeline::{Pipeline, RunReport};
use flightdata::steps::StepContext;
use flightdata::storage::{DirectorySink, SqliteStore};
use flightdata::terrain::TerrainCache;
use flightdata::timezone::NauticalTimezone;
use flightdata::{init_logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Process(cmd) => handle_process(&config, cmd).await,
        Command::Terrain(cmd) => handle_terrain(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_process(config: &Config, cmd: ProcessCommand) -> anyhow::Result<()> {
    let entries = Pipeline::entries_from_dir(&cmd.path)
        .with_context(|| format!("reading {}", cmd.path.display()))?;

    let parse_ctx = ParseContext {
        fleet_id: cmd.fleet_id,
        uploader_id: cmd.uploader_id,
        upload_id: cmd.upload_id,
        airframes: Arc::new(AirframeRegistry::with_fleet_aliases(
            config.airframes.fleet_aliases.clone(),
        )),
        timezone: Arc::new(NauticalTimezone),
        parsing: config.parsing.clone(),
    };

    let store = if cmd.store {
        Some(Arc::new(
            SqliteStore::open(config.database_path()).context("opening flight database")?,
        ))
    } else {
        None
    };
    let mut step_ctx = match &store {
        Some(store) => StepContext::new(store.catalog()),
        None => StepContext::in_memory()?,
    };
    if let Some(directory) = &config.terrain.directory {
        step_ctx = step_ctx.with_terrain(Arc::new(TerrainCache::new(
            directory,
            config.terrain.max_tiles,
        )));
    }

    let mut pipeline = Pipeline::new(ParserRegistry::with_defaults(None), parse_ctx, step_ctx)
        .with_parallelism(config.parallelism(), config.step_parallelism());
    if let Some(store) = store {
        pipeline = pipeline.with_store(store);
    }
    if let Some(dir) = cmd.derived_dir {
        pipeline = pipeline.with_sink(Arc::new(DirectorySink::new(dir)));
    }

    let report = pipeline.run(entries).await?.report();
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Processing Results");
    println!("==================");
    println!("Valid flights:    {}", report.valid_flights);
    println!("Warning flights:  {}", report.warning_flights);
    println!("Failed files:     {}", report.errors.len());
    println!("Derived files:    {}", report.derived_files);

    if !report.flights.is_empty() {
        println!();
        println!("[Flights]");
        for flight in &report.flights {
            println!(
                "  {:<32} {:<16} {:>7} samples  {} -> {}",
                flight.filename,
                flight.airframe,
                flight.samples,
                flight.start.as_deref().unwrap_or("?"),
                flight.end.as_deref().unwrap_or("?"),
            );
            for warning in &flight.warnings {
                println!("      warning: {warning}");
            }
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("[Errors]");
        for (file, error) in &report.errors {
            println!("  {file}: {error}");
        }
    }
}

fn handle_terrain(config: &Config, cmd: &TerrainCommand) -> anyhow::Result<()> {
    let Some(directory) = &config.terrain.directory else {
        bail!("terrain.directory is not configured");
    };
    let cache = TerrainCache::new(directory, config.terrain.max_tiles);
    let ground = cache.ground_elevation_ft(cmd.lat, cmd.lon)?;
    let agl = cache.elevation_above_ground(cmd.msl, cmd.lat, cmd.lon)?;
    println!("Ground elevation: {ground:.0} ft msl");
    println!("Above ground:     {agl} ft");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Pipeline]");
                println!("  File workers:       {}", config.parallelism());
                println!("  Step workers:       {}", config.step_parallelism());
                println!();
                println!("[Terrain]");
                match &config.terrain.directory {
                    Some(dir) => println!("  Directory:          {}", dir.display()),
                    None => println!("  Directory:          (not set, AGL disabled)"),
                }
                println!("  Max tiles:          {}", config.terrain.max_tiles);
                println!();
                println!("[Parsing]");
                println!("  CSV split gap:      {:?}", config.csv_split_gap());
                println!("  GPX split gap:      {:?}", config.gpx_split_gap());
                println!("  GPX min samples:    {}", config.parsing.gpx_min_samples);
                println!("  JSON min duration:  {:?}", config.json_min_duration());
                println!();
                println!("[Airframes]");
                println!(
                    "  Fleet aliases:      {}",
                    config.airframes.fleet_aliases.len()
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
