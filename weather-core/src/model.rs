use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailureKind;

/// A city the job collects observations for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityTarget {
    /// Display name, used for partition keys and record keys.
    pub name: String,
    /// Query sent to the weather source, e.g. `Cape Town,ZA`.
    pub query: String,
    /// IANA timezone of the city. Informational only, keys use UTC.
    pub timezone: String,
}

impl CityTarget {
    pub fn new(name: impl Into<String>, query: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self { name: name.into(), query: query.into(), timezone: timezone.into() }
    }

    /// Shorthand for a city whose query is its display name.
    pub fn named(name: &str, timezone: &str) -> Self {
        Self::new(name, name, timezone)
    }
}

/// Upstream payload for one city, stamped with our own fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub city: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: Value,
}

impl RawObservation {
    /// The payload as persisted: the upstream JSON plus `timestamp` and `city`.
    ///
    /// A non-object payload is wrapped under `data` so the stamp is never lost.
    pub fn stamped(&self, timestamp: &str) -> Value {
        let mut doc = match &self.payload {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other.clone());
                map
            }
        };
        doc.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
        doc.insert("city".to_string(), Value::String(self.city.clone()));
        Value::Object(doc)
    }
}

/// Flat record written to the structured store, keyed by `(city, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub city: String,
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: i16,
    pub pressure: f64,
    pub weather_condition: String,
    pub wind_speed: f64,
    pub weather_description: Option<String>,
    pub visibility: Option<f64>,
    pub cloudiness: Option<i16>,
    pub country: Option<String>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

/// Metadata passed by the external scheduler. Logged, never required.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trigger {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn manual() -> Self {
        Self { id: Some("manual".to_string()), time: Some(Utc::now()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CityStatus {
    Success {
        timestamp: String,
        raw_key: String,
        temperature: f64,
    },
    Error {
        kind: FailureKind,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityOutcome {
    pub city: String,
    #[serde(flatten)]
    pub status: CityStatus,
    pub latency_ms: u64,
}

impl CityOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, CityStatus::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            CityStatus::Success { .. } => None,
            CityStatus::Error { kind, .. } => Some(*kind),
        }
    }
}

/// Result of one invocation. Lives only for the duration of the run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<CityOutcome>,
    pub trigger: Trigger,
    pub latency_ms: u64,
}

impl RunSummary {
    pub fn from_outcomes(results: Vec<CityOutcome>, trigger: Trigger, latency_ms: u64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            trigger,
            latency_ms,
        }
    }

    /// `(city, kind)` for every failed city, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, FailureKind)> {
        self.results.iter().filter_map(|r| r.failure_kind().map(|kind| (r.city.as_str(), kind)))
    }

    pub fn count_of(&self, kind: FailureKind) -> usize {
        self.failures().filter(|(_, k)| *k == kind).count()
    }

    /// Percentage of attempted cities that succeeded. An empty run counts as 0%.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.attempted as f64 * 100.0
    }
}
