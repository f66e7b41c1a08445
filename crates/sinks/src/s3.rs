//! S3 bucket provisioning.

use analitica_core::{ContainerProvisioner, SinkError, SinkResult};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::{debug, info};

/// The region where `CreateBucket` must not carry a location constraint.
const DEFAULT_BUCKET_REGION: &str = "us-east-1";

pub struct S3BucketProvisioner {
    client: Client,
}

impl S3BucketProvisioner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(conf: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(conf))
    }
}

fn map_sdk_error<E, R>(bucket: &str, err: SdkError<E, R>) -> SinkError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let details = format!("{bucket}: {}", DisplayErrorContext(&err));
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            SinkError::Connect {
                details: details.into(),
            }
        }
        _ if details.contains("AccessDenied") || details.contains("403") => {
            SinkError::Permission {
                details: details.into(),
            }
        }
        _ => SinkError::Other(anyhow::anyhow!(details)),
    }
}

#[async_trait]
impl ContainerProvisioner for S3BucketProvisioner {
    async fn container_exists(&self, container: &str) -> SinkResult<bool> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_not_found() => {
                Ok(false)
            }
            Err(e) => Err(map_sdk_error(container, e)),
        }
    }

    async fn create_container(
        &self,
        container: &str,
        region: &str,
    ) -> SinkResult<()> {
        let mut req = self.client.create_bucket().bucket(container);
        if region != DEFAULT_BUCKET_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match req.send().await {
            Ok(_) => {
                info!(bucket = container, region, "bucket created");
                Ok(())
            }
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_bucket_already_owned_by_you() =>
            {
                debug!(bucket = container, "bucket already owned");
                Ok(())
            }
            Err(e) => Err(map_sdk_error(container, e)),
        }
    }
}
