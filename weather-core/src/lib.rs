//! Core library for the `weather-ingest` job.
//!
//! This crate defines:
//! - Configuration loading (defaults, TOML file, environment)
//! - The weather source abstraction and its OpenWeather client
//! - Normalization of raw payloads and partition key derivation
//! - Raw object-store and structured record-store sinks
//! - The ingestion routine that ties them together per city
//!
//! It is used by `weather-ingest-cli`, but the [`Ingestor`] only depends on
//! the capability traits, so other schedulers can drive it as well.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod partition;
pub mod provider;
pub mod sink;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{FailureKind, IngestError, ValidationError};
pub use ingest::Ingestor;
pub use model::{CityOutcome, CityStatus, CityTarget, NormalizedRecord, RawObservation, RunSummary, Trigger};
pub use provider::{WeatherFetcher, fetcher_from_config};
pub use sink::{MemoryRecordSink, ObjectStoreSink, PostgresRecordSink, RawSink, RecordSink};
