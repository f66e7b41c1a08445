use analitica_core::ContainerProvisioner;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{PipelineError, PipelineResult, Resource};

/// What [`ensure_container`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Existing,
    Created,
}

/// Make sure the destination container exists, creating it in `region`
/// when the lookup reports it absent.
pub async fn ensure_container(
    provisioner: &dyn ContainerProvisioner,
    container: &str,
    region: &str,
) -> PipelineResult<ContainerStatus> {
    let exists = provisioner
        .container_exists(container)
        .await
        .map_err(|e| {
            PipelineError::provisioning(Resource::Container, container, e)
        })?;

    if exists {
        debug!(container, "destination container present");
        return Ok(ContainerStatus::Existing);
    }

    provisioner
        .create_container(container, region)
        .await
        .map_err(|e| {
            PipelineError::provisioning(Resource::Container, container, e)
        })?;

    info!(container, region, "destination container created");
    Ok(ContainerStatus::Created)
}
