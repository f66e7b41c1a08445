//! [`ObjectSink`] over the `object_store` crate.
//!
//! One sink instance targets one container. Keys are relative to the
//! container; the backing store decides what a container is (an S3 bucket,
//! a directory, or a slot in memory).

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use analitica_core::{
    ObjectSink, ObjectVersion, PutObject, SinkError, SinkResult,
    StoredObject,
};
use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMode, PutOptions,
    PutPayload, UpdateVersion,
};
use tracing::debug;

pub struct ObjectStoreSink {
    container: String,
    store: Arc<dyn ObjectStore>,
    /// Path all keys are resolved under.
    base: ObjectPath,
    /// `false` for backends that reject object attributes (local files).
    attributes: bool,
}

impl ObjectStoreSink {
    /// Wrap a store whose root is the container.
    pub fn new(
        container: impl Into<String>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            container: container.into(),
            store,
            base: ObjectPath::default(),
            attributes: true,
        }
    }

    /// Process-local store, used by tests and dry runs.
    pub fn in_memory(container: impl Into<String>) -> Self {
        Self::new(container, Arc::new(InMemory::new()))
    }

    /// Write under `<root>/<container>/` on the local filesystem.
    ///
    /// Content type and metadata are not persisted: the local backend has
    /// no attribute support. Conditional overwrites are rejected with an
    /// error for the same reason.
    pub fn local(
        root: impl AsRef<FsPath>,
        container: impl Into<String>,
    ) -> SinkResult<Self> {
        let container = container.into();
        let dir = std::path::absolute(root.as_ref().join(&container))?;
        let base = ObjectPath::from_absolute_path(&dir)
            .map_err(|e| SinkError::Other(e.into()))?;

        Ok(Self {
            container,
            store: Arc::new(LocalFileSystem::new()),
            base,
            attributes: false,
        })
    }

    /// S3 bucket store. Credentials come from the standard AWS
    /// environment variables.
    #[cfg(feature = "aws")]
    pub fn s3(bucket: &str, region: &str) -> SinkResult<Self> {
        use object_store::aws::{AmazonS3Builder, S3ConditionalPut};

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .with_conditional_put(S3ConditionalPut::ETagMatch)
            .build()
            .map_err(|e| SinkError::Connect {
                details: format!("s3 store for {bucket}: {e}").into(),
            })?;
        Ok(Self::new(bucket, Arc::new(store)))
    }

    fn path(&self, key: &str) -> ObjectPath {
        if self.base.as_ref().is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.base, key))
        }
    }

    fn options(&self, object: &PutObject, mode: PutMode) -> PutOptions {
        let mut attributes = Attributes::new();
        if self.attributes {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(object.content_type.clone()),
            );
            for (k, v) in &object.metadata {
                attributes.insert(
                    Attribute::Metadata(Cow::Owned(k.clone())),
                    AttributeValue::from(v.clone()),
                );
            }
        }
        PutOptions {
            mode,
            attributes,
            ..Default::default()
        }
    }

    async fn put_with(
        &self,
        object: PutObject,
        mode: PutMode,
    ) -> Result<(), object_store::Error> {
        let path = self.path(&object.key);
        let opts = self.options(&object, mode);
        let size = object.body.len();

        self.store
            .put_opts(&path, PutPayload::from(object.body), opts)
            .await?;

        debug!(
            container = %self.container,
            key = %object.key,
            size,
            "object written"
        );
        Ok(())
    }
}

fn store_err(err: object_store::Error) -> SinkError {
    SinkError::Other(err.into())
}

#[async_trait]
impl ObjectSink for ObjectStoreSink {
    fn container(&self) -> &str {
        &self.container
    }

    async fn put_object(&self, object: PutObject) -> SinkResult<()> {
        self.put_with(object, PutMode::Overwrite)
            .await
            .map_err(store_err)
    }

    async fn put_object_if_absent(
        &self,
        object: PutObject,
    ) -> SinkResult<bool> {
        match self.put_with(object, PutMode::Create).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn put_object_if_match(
        &self,
        object: PutObject,
        expected: &ObjectVersion,
    ) -> SinkResult<bool> {
        let mode = PutMode::Update(UpdateVersion {
            e_tag: expected.e_tag.clone(),
            version: expected.version.clone(),
        });
        match self.put_with(object, mode).await {
            Ok(()) => Ok(true),
            Err(
                object_store::Error::Precondition { .. }
                | object_store::Error::NotFound { .. },
            ) => Ok(false),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn get_object(
        &self,
        key: &str,
    ) -> SinkResult<Option<StoredObject>> {
        let result = match self.store.get(&self.path(key)).await {
            Ok(r) => r,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(store_err(e)),
        };

        let mut content_type = None;
        let mut metadata = BTreeMap::new();
        for (attr, value) in result.attributes.iter() {
            match attr {
                Attribute::ContentType => {
                    content_type = Some(value.as_ref().to_owned())
                }
                Attribute::Metadata(k) => {
                    metadata.insert(k.to_string(), value.as_ref().to_owned());
                }
                _ => {}
            }
        }

        let version = ObjectVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let body = result.bytes().await.map_err(store_err)?;
        Ok(Some(StoredObject {
            body,
            content_type,
            metadata,
            version,
        }))
    }

    async fn delete_object(&self, key: &str) -> SinkResult<()> {
        match self.store.delete(&self.path(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(store_err(e)),
        }
    }
}

/// Directory a local sink writes `container` into.
pub fn local_container_dir(root: &FsPath, container: &str) -> PathBuf {
    root.join(container)
}
