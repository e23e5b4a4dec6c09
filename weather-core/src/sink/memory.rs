use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Mutex};

use super::RecordSink;
use crate::model::NormalizedRecord;

/// Record store held in memory, keyed by `(city, timestamp)`. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<BTreeMap<(String, String), NormalizedRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records ordered by city, then timestamp.
    pub fn records(&self) -> Vec<NormalizedRecord> {
        match self.records.lock() {
            Ok(records) => records.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn write(&self, record: &NormalizedRecord) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| anyhow!("In-memory record store is poisoned"))?;
        records.insert((record.city.clone(), record.timestamp.clone()), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(city: &str, timestamp: &str, temperature: f64) -> NormalizedRecord {
        NormalizedRecord {
            city: city.into(),
            timestamp: timestamp.into(),
            temperature,
            humidity: 50,
            pressure: 1013.0,
            weather_condition: "Clouds".into(),
            wind_speed: 2.0,
            weather_description: None,
            visibility: None,
            cloudiness: None,
            country: None,
            sunrise: None,
            sunset: None,
        }
    }

    #[tokio::test]
    async fn write_upserts_by_city_and_timestamp() {
        let sink = MemoryRecordSink::new();

        sink.write(&record("Durban", "2025-08-17T16:40:41", 20.0)).await.unwrap();
        sink.write(&record("Durban", "2025-08-17T16:40:41", 21.0)).await.unwrap();
        sink.write(&record("Durban", "2025-08-17T16:55:41", 22.0)).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].temperature, 21.0);
        assert_eq!(records[1].timestamp, "2025-08-17T16:55:41");
    }
}
