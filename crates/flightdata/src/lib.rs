//! `flightdata` - Flight-recorder ingestion pipeline
//!
//! This library turns raw flight-recorder files into flights: named numeric
//! and text columns plus metadata. Parsers build the raw columns, then a
//! dependency graph of process steps derives the rest in parallel.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod airframes;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod itinerary;
pub mod logging;
pub mod meta;
pub mod parse;
pub mod pipeline;
pub mod series;
pub mod steps;
pub mod storage;
pub mod terrain;
pub mod timezone;

pub use builder::{Flight, FlightBuilder};
pub use config::Config;
pub use error::{Error, Result};
pub use graph::DependencyGraph;
pub use logging::init_logging;
pub use pipeline::{ArchiveEntry, Pipeline, RunReport};
pub use storage::{FlightStore, SqliteStore};
