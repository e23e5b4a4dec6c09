//! The ingestion routine: fetch, normalize and dual-write every configured city.
//!
//! Each city runs an independent pipeline. Its failure is classified into a
//! [`FailureKind`](crate::error::FailureKind), logged and reported in the [`RunSummary`]; it never stops
//! the other cities and never escapes [`Ingestor::run`].

use anyhow::anyhow;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    clock::Clock,
    config::{Config, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECONDS},
    error::IngestError,
    events::{Event, Phase},
    model::{CityOutcome, CityStatus, CityTarget, NormalizedRecord, RawObservation, RunSummary, Trigger},
    normalize::normalize,
    partition::{format_timestamp, raw_key},
    provider::WeatherFetcher,
    sink::{RawObject, RawSink, RecordSink},
};

/// What one successful city pipeline produced.
#[derive(Debug, Clone, PartialEq)]
struct Ingested {
    timestamp: String,
    raw_key: String,
    temperature: f64,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    fetcher: Arc<dyn WeatherFetcher>,
    raw_sink: Arc<dyn RawSink>,
    record_sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        fetcher: Arc<dyn WeatherFetcher>,
        raw_sink: Arc<dyn RawSink>,
        record_sink: Arc<dyn RecordSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            raw_sink,
            record_sink,
            clock,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bound for a single fetch. A fetch that exceeds it counts as `FetchFailed`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of cities in flight. Values below one are treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Apply the timeout and concurrency settings from `config`.
    pub fn configured(self, config: &Config) -> Self {
        self.with_timeout(config.timeout()).with_concurrency(config.concurrency)
    }

    /// Process every city and summarize. Outcomes keep the input order.
    pub async fn run(&self, cities: &[CityTarget], trigger: &Trigger) -> RunSummary {
        let started = Instant::now();
        log::info!(
            "Starting weather ingestion for {} cities (trigger id: {}, time: {})",
            cities.len(),
            trigger.id.as_deref().unwrap_or("-"),
            trigger.time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        );

        let results: Vec<CityOutcome> = stream::iter(cities)
            .map(|city| self.ingest_city(city))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = RunSummary::from_outcomes(results, trigger.clone(), elapsed_ms(started));

        Event::run(summary.latency_ms)
            .with("attempted", summary.attempted)
            .with("succeeded", summary.succeeded)
            .with("failed", summary.failed)
            .with("success_rate", format!("{:.1}%", summary.success_rate()))
            .emit();

        summary
    }

    async fn ingest_city(&self, city: &CityTarget) -> CityOutcome {
        let started = Instant::now();

        let status = match self.process(city).await {
            Ok(done) => CityStatus::Success {
                timestamp: done.timestamp,
                raw_key: done.raw_key,
                temperature: done.temperature,
            },
            Err(err) => CityStatus::Error { kind: err.kind(), error: err.to_string() },
        };

        let latency_ms = elapsed_ms(started);
        city_event(&city.name, &status, latency_ms).emit();

        CityOutcome { city: city.name.clone(), status, latency_ms }
    }

    async fn process(&self, city: &CityTarget) -> Result<Ingested, IngestError> {
        let payload = self.fetch(city).await?;

        // Our own fetch time, not the upstream `dt`, so keys are comparable across cities.
        let fetched_at = self.clock.now();
        let timestamp = format_timestamp(fetched_at);

        let record = self.normalize(city, &timestamp, &payload)?;

        let raw = RawObservation { city: city.name.clone(), fetched_at, payload };
        let key = raw_key(&city.name, fetched_at);

        // Independent best-effort writes: a failed raw write does not skip the record.
        let raw_result = self.write_raw(&raw, &key, &timestamp).await;
        let record_result = self.write_record(&record).await;
        raw_result?;
        record_result?;

        Ok(Ingested { timestamp, raw_key: key, temperature: record.temperature })
    }

    async fn fetch(&self, city: &CityTarget) -> Result<serde_json::Value, IngestError> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.fetcher.fetch(city)).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(cause)) => Err(IngestError::FetchFailed { cause }),
            Err(_) => Err(IngestError::FetchFailed {
                cause: anyhow!("timed out after {}s", self.timeout.as_secs_f64()),
            }),
        };

        phase_event(&city.name, Phase::Fetch, started, &result);
        result
    }

    fn normalize(
        &self,
        city: &CityTarget,
        timestamp: &str,
        payload: &serde_json::Value,
    ) -> Result<NormalizedRecord, IngestError> {
        let started = Instant::now();
        let result = normalize(&city.name, timestamp, payload).map_err(IngestError::from);
        phase_event(&city.name, Phase::Normalize, started, &result);
        result
    }

    async fn write_raw(&self, raw: &RawObservation, key: &str, timestamp: &str) -> Result<(), IngestError> {
        let started = Instant::now();

        let result = match serde_json::to_vec_pretty(&raw.stamped(timestamp)) {
            Ok(body) => {
                let object = RawObject {
                    key: key.to_string(),
                    body: Bytes::from(body),
                    city: raw.city.clone(),
                    collection_time: timestamp.to_string(),
                };
                self.raw_sink.put(&object).await
            }
            Err(err) => Err(anyhow!(err).context("Failed to serialize raw payload")),
        }
        .map_err(|cause| IngestError::RawWriteFailed { key: key.to_string(), cause });

        phase_event(&raw.city, Phase::RawWrite, started, &result);
        result
    }

    async fn write_record(&self, record: &NormalizedRecord) -> Result<(), IngestError> {
        let started = Instant::now();
        let result = self
            .record_sink
            .write(record)
            .await
            .map_err(|cause| IngestError::RecordWriteFailed { cause });
        phase_event(&record.city, Phase::RecordWrite, started, &result);
        result
    }
}

/// Closing event for one city; failures also name the phase that produced them.
fn city_event<'a>(city: &'a str, status: &CityStatus, latency_ms: u64) -> Event<'a> {
    let event = Event::city(city, Phase::City, latency_ms);
    match status {
        CityStatus::Success { .. } => event,
        CityStatus::Error { kind, error } => event.failed(*kind, error).with("failed_phase", kind.phase().as_str()),
    }
}

fn phase_event<T>(city: &str, phase: Phase, started: Instant, result: &Result<T, IngestError>) {
    let event = Event::city(city, phase, elapsed_ms(started));
    match result {
        Ok(_) => log::debug!("{}", event.render()),
        Err(err) => event.failed(err.kind(), err).emit(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
