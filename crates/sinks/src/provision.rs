use std::collections::HashSet;
use std::path::PathBuf;

use analitica_core::{ContainerProvisioner, SinkError, SinkResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::store::local_container_dir;

/// Containers are directories under a root on the local filesystem.
pub struct LocalContainerProvisioner {
    root: PathBuf,
}

impl LocalContainerProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContainerProvisioner for LocalContainerProvisioner {
    async fn container_exists(&self, container: &str) -> SinkResult<bool> {
        let dir = local_container_dir(&self.root, container);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(
        &self,
        container: &str,
        region: &str,
    ) -> SinkResult<()> {
        let dir = local_container_dir(&self.root, container);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), region, "local container created");
        Ok(())
    }
}

/// In-process provisioner that records every creation.
#[derive(Default)]
pub struct MemContainerProvisioner {
    containers: Mutex<HashSet<String>>,
    created: Mutex<Vec<(String, String)>>,
    create_failure: Mutex<Option<SinkError>>,
}

impl MemContainerProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an existing container.
    pub fn with_container(self, container: &str) -> Self {
        self.containers.lock().insert(container.to_owned());
        self
    }

    /// Make the next `create_container` call fail with `err`.
    pub fn fail_next_create(&self, err: SinkError) {
        *self.create_failure.lock() = Some(err);
    }

    /// `(container, region)` pairs passed to `create_container`, in order.
    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl ContainerProvisioner for MemContainerProvisioner {
    async fn container_exists(&self, container: &str) -> SinkResult<bool> {
        Ok(self.containers.lock().contains(container))
    }

    async fn create_container(
        &self,
        container: &str,
        region: &str,
    ) -> SinkResult<()> {
        if let Some(err) = self.create_failure.lock().take() {
            return Err(err);
        }
        self.containers.lock().insert(container.to_owned());
        self.created
            .lock()
            .push((container.to_owned(), region.to_owned()));
        Ok(())
    }
}
