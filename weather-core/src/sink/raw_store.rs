use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload, aws::AmazonS3Builder, local::LocalFileSystem,
    memory::InMemory, path::Path,
};
use std::{fs, path::Path as FsPath, sync::Arc};

use super::{DATA_SOURCE, RawObject, RawSink};
use crate::Config;

/// [`RawSink`] over any `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    /// Whether the backend keeps content type and user metadata.
    attributes: bool,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store, attributes: true }
    }

    /// S3 bucket. Region, endpoint and credentials come from the usual `AWS_*` variables.
    pub fn s3(bucket: &str) -> Result<Self> {
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .with_context(|| format!("Failed to configure S3 bucket '{bucket}'"))?;
        Ok(Self::new(Arc::new(s3)))
    }

    /// Directory on the local filesystem, created if missing.
    pub fn local(dir: &FsPath) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create raw data directory: {}", dir.display()))?;
        let store = LocalFileSystem::new_with_prefix(dir)
            .with_context(|| format!("Failed to open raw data directory: {}", dir.display()))?;
        // The local backend rejects object attributes.
        Ok(Self { store: Arc::new(store), attributes: false })
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// A local directory wins over a bucket so development runs never touch S3.
    pub fn from_config(config: &Config) -> Result<Self> {
        match (&config.raw_data_dir, &config.bucket_name) {
            (Some(dir), _) => Self::local(dir),
            (None, Some(bucket)) => Self::s3(bucket),
            (None, None) => bail!(
                "No raw data destination configured.\n\
                 Hint: set BUCKET_NAME (or S3_BUCKET_NAME), or RAW_DATA_DIR for a local directory."
            ),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    fn put_options(&self, object: &RawObject) -> PutOptions {
        if !self.attributes {
            return PutOptions::default();
        }

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, "application/json".into());
        attributes.insert(Attribute::Metadata("city".into()), object.city.clone().into());
        attributes.insert(Attribute::Metadata("collection_time".into()), object.collection_time.clone().into());
        attributes.insert(Attribute::Metadata("data_source".into()), DATA_SOURCE.into());

        PutOptions { attributes, ..Default::default() }
    }
}

#[async_trait]
impl RawSink for ObjectStoreSink {
    async fn put(&self, object: &RawObject) -> Result<()> {
        let path = Path::from(object.key.as_str());
        self.store
            .put_opts(&path, PutPayload::from(object.body.clone()), self.put_options(object))
            .await
            .with_context(|| format!("Failed to store raw object {}", object.key))?;
        Ok(())
    }
}
