//! AWS Glue Data Catalog backend.
//!
//! `GetCrawler` reports the state and the last run status but not the
//! table counts; those come from `GetCrawlerMetrics` and are only fetched
//! once the crawler is back to READY.

use analitica_core::{
    CatalogError, CatalogResult, CatalogService, CrawlerDefinition,
    CrawlerState, CrawlerStatus, DatabaseDefinition, DatabaseInfo, LastCrawl,
};
use async_trait::async_trait;
use aws_sdk_glue::Client;
use aws_sdk_glue::error::{DisplayErrorContext, SdkError};
use aws_sdk_glue::types::{CrawlerTargets, DatabaseInput, S3Target};
use tracing::{debug, warn};

pub struct GlueCatalog {
    client: Client,
}

impl GlueCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(conf: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(conf))
    }

    fn targets(def: &CrawlerDefinition) -> CrawlerTargets {
        let s3 = def
            .s3_targets
            .iter()
            .map(|path| S3Target::builder().path(path).build())
            .collect();
        CrawlerTargets::builder().set_s3_targets(Some(s3)).build()
    }

    async fn crawl_counts(
        &self,
        name: &str,
    ) -> CatalogResult<(u64, u64, u64)> {
        let out = self
            .client
            .get_crawler_metrics()
            .crawler_name_list(name)
            .send()
            .await
            .map_err(unexpected)?;

        let counts = out
            .crawler_metrics_list()
            .iter()
            .find(|m| m.crawler_name() == Some(name))
            .map(|m| {
                (
                    count(m.tables_created()),
                    count(m.tables_updated()),
                    count(m.tables_deleted()),
                )
            })
            .unwrap_or_default();
        Ok(counts)
    }
}

fn count(n: i32) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn unexpected<E, R>(err: SdkError<E, R>) -> CatalogError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let details = DisplayErrorContext(&err).to_string();
    if details.contains("AccessDenied") {
        CatalogError::Permission {
            details: details.into(),
        }
    } else {
        CatalogError::Unexpected {
            details: details.into(),
        }
    }
}

fn build_err(err: aws_sdk_glue::error::BuildError) -> CatalogError {
    CatalogError::Other(err.into())
}

#[async_trait]
impl CatalogService for GlueCatalog {
    async fn get_database(
        &self,
        name: &str,
    ) -> CatalogResult<Option<DatabaseInfo>> {
        match self.client.get_database().name(name).send().await {
            Ok(out) => Ok(out.database().map(|db| DatabaseInfo {
                name: db.name().to_owned(),
                description: db.description().map(Into::into),
            })),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_entity_not_found_exception() =>
            {
                Ok(None)
            }
            Err(e) => Err(unexpected(e)),
        }
    }

    async fn create_database(
        &self,
        def: &DatabaseDefinition,
    ) -> CatalogResult<()> {
        let input = DatabaseInput::builder()
            .name(&def.name)
            .description(&def.description)
            .build()
            .map_err(build_err)?;

        match self.client.create_database().database_input(input).send().await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_already_exists_exception() =>
            {
                Err(CatalogError::AlreadyExists {
                    entity: "database",
                    name: def.name.clone(),
                })
            }
            Err(e) => Err(unexpected(e)),
        }
    }

    async fn get_crawler(
        &self,
        name: &str,
    ) -> CatalogResult<Option<CrawlerStatus>> {
        let out = match self.client.get_crawler().name(name).send().await {
            Ok(out) => out,
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_entity_not_found_exception() =>
            {
                return Ok(None);
            }
            Err(e) => return Err(unexpected(e)),
        };

        let Some(crawler) = out.crawler() else {
            return Ok(None);
        };

        let raw_state = crawler.state().map(|s| s.as_str()).unwrap_or("");
        let state = CrawlerState::parse(raw_state).ok_or_else(|| {
            CatalogError::Unexpected {
                details: format!("unknown crawler state {raw_state:?}").into(),
            }
        })?;

        let mut last_crawl = crawler.last_crawl().map(|lc| LastCrawl {
            status: lc
                .status()
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default(),
            error_message: lc.error_message().map(Into::into),
            ..Default::default()
        });

        if state == CrawlerState::Ready {
            if let Some(lc) = last_crawl.as_mut() {
                match self.crawl_counts(name).await {
                    Ok((created, updated, deleted)) => {
                        lc.tables_created = created;
                        lc.tables_updated = updated;
                        lc.tables_deleted = deleted;
                    }
                    Err(e) => {
                        warn!(
                            crawler = name,
                            error = %e,
                            "crawler metrics unavailable"
                        );
                    }
                }
            }
        }

        debug!(crawler = name, %state, "glue crawler status");
        Ok(Some(CrawlerStatus {
            name: name.to_owned(),
            state,
            last_crawl,
        }))
    }

    async fn create_crawler(
        &self,
        def: &CrawlerDefinition,
    ) -> CatalogResult<()> {
        let res = self
            .client
            .create_crawler()
            .name(&def.name)
            .role(&def.role)
            .database_name(&def.database)
            .targets(Self::targets(def))
            .description(&def.description)
            .send()
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_already_exists_exception() =>
            {
                Err(CatalogError::AlreadyExists {
                    entity: "crawler",
                    name: def.name.clone(),
                })
            }
            Err(e) => Err(unexpected(e)),
        }
    }

    async fn update_crawler(
        &self,
        def: &CrawlerDefinition,
    ) -> CatalogResult<()> {
        let res = self
            .client
            .update_crawler()
            .name(&def.name)
            .role(&def.role)
            .database_name(&def.database)
            .targets(Self::targets(def))
            .description(&def.description)
            .send()
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_entity_not_found_exception() =>
            {
                Err(CatalogError::NotFound {
                    entity: "crawler",
                    name: def.name.clone(),
                })
            }
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_crawler_running_exception() =>
            {
                Err(CatalogError::AlreadyRunning {
                    name: def.name.clone(),
                })
            }
            Err(e) => Err(unexpected(e)),
        }
    }

    async fn start_crawler(&self, name: &str) -> CatalogResult<()> {
        match self.client.start_crawler().name(name).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_crawler_running_exception() =>
            {
                Err(CatalogError::AlreadyRunning {
                    name: name.to_owned(),
                })
            }
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_entity_not_found_exception() =>
            {
                Err(CatalogError::NotFound {
                    entity: "crawler",
                    name: name.to_owned(),
                })
            }
            Err(e) => Err(unexpected(e)),
        }
    }
}
