//! Object-storage access for test-run archives and daily records.
//!
//! Keys are plain strings relative to the configured prefix:
//!
//! ```text
//! {prefix}/2024-06-03-headlesschrome   # zipped test run, written by CI
//! {prefix}/data/2024-06-03.json        # daily record, written here
//! ```

mod spec;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use thiserror::Error;

use crate::error::{EtlError, Result};

pub use spec::StoreSpec;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("object already exists: {key}")]
    AlreadyExists { key: String },

    #[error("object store error for {key}: {source}")]
    Backend {
        key: String,
        #[source]
        source: object_store::Error,
    },
}

impl StoreError {
    fn from_object_store(err: object_store::Error, key: &str) -> Self {
        let key = key.to_string();
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound { key },
            object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
                Self::AlreadyExists { key }
            }
            source => Self::Backend { key, source },
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The three object-storage operations the pipeline needs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Bucket identifier for log and error messages.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Create-only write. Returns `StoreError::AlreadyExists` instead of
    /// overwriting an object that appeared since the caller last looked.
    ///
    /// Backends without conditional writes get a plain put; callers check
    /// `exists` first and that check is the only guard there.
    async fn put_if_absent(&self, key: &str, body: Bytes) -> StoreResult<()>;
}

/// `ArtifactStore` backed by the `object_store` crate (S3, local files, memory).
pub struct ObjectArtifactStore {
    inner: Arc<dyn ObjectStore>,
    prefix: String,
    name: String,
}

impl ObjectArtifactStore {
    pub fn from_spec(spec: &StoreSpec) -> Result<Self> {
        let invalid = |reason: String| EtlError::InvalidStore {
            spec: spec.display_name(),
            reason,
        };

        let (inner, prefix): (Arc<dyn ObjectStore>, String) = match spec.scheme.as_str() {
            "memory" => (
                Arc::new(object_store::memory::InMemory::new()),
                spec.prefix.clone(),
            ),
            "file" => {
                let root = format!("/{}", spec.prefix);
                std::fs::create_dir_all(&root)?;
                let local = object_store::local::LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| invalid(format!("failed to open {root}: {e}")))?;
                (Arc::new(local), String::new())
            }
            "s3" => {
                let bucket = spec
                    .bucket
                    .as_deref()
                    .ok_or_else(|| invalid("S3 URL must include a bucket name".to_string()))?;

                let mut builder =
                    object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &spec.region {
                    builder = builder.with_region(region);
                }

                let s3 = builder
                    .build()
                    .map_err(|e| invalid(format!("failed to create S3 client: {e}")))?;
                (Arc::new(s3), spec.prefix.clone())
            }
            scheme => return Err(invalid(format!("unsupported scheme: {scheme}"))),
        };

        Ok(Self {
            inner,
            prefix,
            name: spec.display_name(),
        })
    }

    /// Wraps an existing store; used by tests with `InMemory`.
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: &str, name: &str) -> Self {
        Self {
            inner,
            prefix: prefix.trim_matches('/').to_string(),
            name: name.to_string(),
        }
    }

    fn path(&self, key: &str) -> Path {
        if self.prefix.is_empty() {
            Path::from(key)
        } else {
            Path::from(format!("{}/{key}", self.prefix))
        }
    }
}

fn conditional_put_unsupported(err: &object_store::Error) -> bool {
    matches!(
        err,
        object_store::Error::NotImplemented | object_store::Error::NotSupported { .. }
    )
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.path(key);
        debug!("GET {}/{path}", self.name);

        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|e| StoreError::from_object_store(e, key))?;
        result
            .bytes()
            .await
            .map_err(|e| StoreError::from_object_store(e, key))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path(key);
        debug!("HEAD {}/{path}", self.name);

        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::from_object_store(e, key)),
        }
    }

    async fn put_if_absent(&self, key: &str, body: Bytes) -> StoreResult<()> {
        let path = self.path(key);
        debug!("PUT {}/{path} ({} bytes)", self.name, body.len());

        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };

        match self
            .inner
            .put_opts(&path, PutPayload::from_bytes(body.clone()), opts)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if conditional_put_unsupported(&e) => {
                warn!(
                    "Conditional writes not supported by {}, writing {key} unconditionally",
                    self.name
                );
                self.inner
                    .put(&path, PutPayload::from_bytes(body))
                    .await
                    .map(|_| ())
                    .map_err(|e| StoreError::from_object_store(e, key))
            }
            Err(e) => Err(StoreError::from_object_store(e, key)),
        }
    }
}
