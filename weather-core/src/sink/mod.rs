//! Write-side collaborators: the raw object store and the structured record store.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

use crate::model::NormalizedRecord;

pub mod memory;
pub mod postgres;
pub mod raw_store;

pub use memory::MemoryRecordSink;
pub use postgres::PostgresRecordSink;
pub use raw_store::ObjectStoreSink;

/// Data source label attached to every raw object.
pub const DATA_SOURCE: &str = "openweathermap";

/// One raw payload ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub key: String,
    pub body: Bytes,
    pub city: String,
    pub collection_time: String,
}

/// Object-store writer. Overwrites any existing object at the key.
#[async_trait]
pub trait RawSink: Send + Sync + Debug {
    async fn put(&self, object: &RawObject) -> Result<()>;
}

/// Structured-store writer. Upserts by `(city, timestamp)`.
#[async_trait]
pub trait RecordSink: Send + Sync + Debug {
    async fn write(&self, record: &NormalizedRecord) -> Result<()>;
}
