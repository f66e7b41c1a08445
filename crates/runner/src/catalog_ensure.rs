//! Idempotent provisioning of the catalog database and crawler.

use analitica_config::RunConfiguration;
use analitica_core::{
    CatalogError, CatalogService, CrawlerDefinition, DatabaseDefinition,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult, Resource};

pub const DATABASE_DESCRIPTION: &str =
    "Data ingested from the operational key-value tables for analytics.";

pub const CRAWLER_DESCRIPTION: &str =
    "Crawler for data ingested from the operational key-value tables.";

/// What an ensure step did to the external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensured {
    Existing,
    Created,
    Updated,
}

pub fn database_definition(cfg: &RunConfiguration) -> DatabaseDefinition {
    DatabaseDefinition {
        name: cfg.glue_database.clone(),
        description: DATABASE_DESCRIPTION.to_owned(),
    }
}

/// The crawler scans the whole export prefix, history included.
pub fn crawler_definition(cfg: &RunConfiguration) -> CrawlerDefinition {
    CrawlerDefinition {
        name: cfg.glue_crawler.clone(),
        role: cfg.glue_role.clone(),
        database: cfg.glue_database.clone(),
        s3_targets: vec![cfg.crawler_target()],
        description: CRAWLER_DESCRIPTION.to_owned(),
    }
}

/// Create the catalog database unless it already exists.
///
/// A create that loses a race with a concurrent run counts as success.
pub async fn ensure_database(
    catalog: &dyn CatalogService,
    def: &DatabaseDefinition,
) -> PipelineResult<Ensured> {
    let fail = |e: CatalogError| {
        PipelineError::provisioning(Resource::Database, &def.name, e)
    };

    if catalog.get_database(&def.name).await.map_err(fail)?.is_some() {
        debug!(database = %def.name, "catalog database present");
        return Ok(Ensured::Existing);
    }

    match catalog.create_database(def).await {
        Ok(()) => {
            info!(database = %def.name, "catalog database created");
            Ok(Ensured::Created)
        }
        Err(e) if e.is_already_exists() => {
            warn!(
                database = %def.name,
                "catalog database created concurrently"
            );
            Ok(Ensured::Existing)
        }
        Err(e) => Err(fail(e)),
    }
}

/// Create the crawler, or bring an existing one in line with `def`.
///
/// A crawler that is mid-crawl cannot be updated; it keeps its current
/// definition and the crawl runner waits for it to go idle.
pub async fn ensure_crawler(
    catalog: &dyn CatalogService,
    def: &CrawlerDefinition,
) -> PipelineResult<Ensured> {
    let fail = |e: CatalogError| {
        PipelineError::provisioning(Resource::Crawler, &def.name, e)
    };

    let existing = catalog.get_crawler(&def.name).await.map_err(fail)?;
    if existing.is_some() {
        return match catalog.update_crawler(def).await {
            Ok(()) => {
                info!(crawler = %def.name, targets = ?def.s3_targets, "crawler updated");
                Ok(Ensured::Updated)
            }
            Err(e) if e.is_already_running() => {
                warn!(
                    crawler = %def.name,
                    "crawler busy, keeping its current definition"
                );
                Ok(Ensured::Existing)
            }
            Err(e) => Err(fail(e)),
        };
    }

    catalog.create_crawler(def).await.map_err(fail)?;
    info!(crawler = %def.name, targets = ?def.s3_targets, "crawler created");
    Ok(Ensured::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProvisionFailure;
    use catalog::{CatalogOp, CrawlStep, MemCatalog};
    use pretty_assertions::assert_eq;

    fn cfg() -> RunConfiguration {
        RunConfiguration::from_lookup(|k| {
            match k {
                "ANALITICA_TABLES" => Some("incidentes=Incidentes"),
                "ANALITICA_S3_BUCKET" => Some("bucket"),
                "ANALITICA_GLUE_DATABASE" => Some("analitica_db"),
                "ANALITICA_GLUE_CRAWLER" => Some("analitica_crawler"),
                "AWS_ACCOUNT_ID" => Some("123456789012"),
                _ => None,
            }
            .map(Into::into)
        })
        .unwrap()
    }

    #[test]
    fn crawler_definition_targets_export_prefix() {
        let def = crawler_definition(&cfg());
        assert_eq!(def.s3_targets, vec!["s3://bucket/analitica/ingesta"]);
        assert_eq!(def.role, "arn:aws:iam::123456789012:role/LabRole");
        assert_eq!(def.database, "analitica_db");
        assert_eq!(def.description, CRAWLER_DESCRIPTION);
    }

    #[tokio::test]
    async fn database_is_created_once() {
        let cat = MemCatalog::new();
        let def = database_definition(&cfg());

        let first = ensure_database(&cat, &def).await.unwrap();
        let second = ensure_database(&cat, &def).await.unwrap();

        assert_eq!((first, second), (Ensured::Created, Ensured::Existing));
        assert_eq!(cat.count(CatalogOp::CreateDatabase), 1);
        assert_eq!(
            cat.database("analitica_db").unwrap().description.as_deref(),
            Some(DATABASE_DESCRIPTION)
        );
    }

    #[tokio::test]
    async fn lost_create_race_is_success() {
        let cat = MemCatalog::new();
        cat.fail_next(
            CatalogOp::CreateDatabase,
            CatalogError::AlreadyExists {
                entity: "database",
                name: "analitica_db".into(),
            },
        );

        let status = ensure_database(&cat, &database_definition(&cfg()))
            .await
            .unwrap();
        assert_eq!(status, Ensured::Existing);
    }

    #[tokio::test]
    async fn database_lookup_failure_is_provisioning_error() {
        let cat = MemCatalog::new();
        cat.fail_next(
            CatalogOp::GetDatabase,
            CatalogError::Permission {
                details: "denied".into(),
            },
        );

        let err = ensure_database(&cat, &database_definition(&cfg()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Provisioning {
                resource: Resource::Database,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn crawler_is_created_then_updated() {
        let cat = MemCatalog::new();
        let mut def = crawler_definition(&cfg());

        let created = ensure_crawler(&cat, &def).await.unwrap();
        assert_eq!(created, Ensured::Created);

        def.role = "arn:aws:iam::1:role/Other".into();
        let updated = ensure_crawler(&cat, &def).await.unwrap();
        assert_eq!(updated, Ensured::Updated);
        assert_eq!(cat.crawler("analitica_crawler").unwrap(), def);
    }

    #[tokio::test]
    async fn running_crawler_keeps_its_definition() {
        let def = crawler_definition(&cfg());
        let mut old = def.clone();
        old.role = "arn:aws:iam::1:role/Old".into();
        let cat = MemCatalog::new().with_crawler(old.clone());
        cat.script_crawl(&def.name, [CrawlStep::running()]);

        let status = ensure_crawler(&cat, &def).await.unwrap();

        assert_eq!(status, Ensured::Existing);
        assert_eq!(cat.count(CatalogOp::UpdateCrawler), 1);
        assert_eq!(cat.crawler("analitica_crawler").unwrap(), old);
    }

    #[tokio::test]
    async fn crawler_create_failure_is_provisioning_error() {
        let cat = MemCatalog::new();
        cat.fail_next(
            CatalogOp::CreateCrawler,
            CatalogError::Permission {
                details: "glue:CreateCrawler denied".into(),
            },
        );

        let err = ensure_crawler(&cat, &crawler_definition(&cfg()))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::Provisioning {
                    resource: Resource::Crawler,
                    source: ProvisionFailure::Catalog(CatalogError::Permission { .. }),
                    ..
                }
            ),
            "{err}"
        );
        assert!(cat.crawler("analitica_crawler").is_none());
    }

    #[tokio::test]
    async fn crawler_update_failure_is_provisioning_error() {
        let def = crawler_definition(&cfg());
        let cat = MemCatalog::new().with_crawler(def.clone());
        cat.fail_next(
            CatalogOp::UpdateCrawler,
            CatalogError::Unexpected {
                details: "InvalidInputException".into(),
            },
        );

        let err = ensure_crawler(&cat, &def).await.unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::Provisioning {
                    resource: Resource::Crawler,
                    ref name,
                    source: ProvisionFailure::Catalog(CatalogError::Unexpected { .. }),
                } if name == "analitica_crawler"
            ),
            "{err}"
        );
    }
}
