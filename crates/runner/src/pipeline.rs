//! One end-to-end invocation: provision, export, catalog, crawl.

use analitica_config::RunConfiguration;
use analitica_core::{
    ArcDynCatalog, ArcDynProvisioner, ArcDynSink, ArcDynSource, CrawlOutcome,
    ExportSummary,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog_ensure::{
    Ensured, crawler_definition, database_definition, ensure_crawler,
    ensure_database,
};
use crate::crawler_runner::CrawlerRunner;
use crate::errors::PipelineResult;
use crate::exporter::TableExporter;
use crate::lease::RunLease;
use crate::provisioner::{ContainerStatus, ensure_container};

/// External services a run talks to. Built once per process.
#[derive(Clone)]
pub struct Services {
    pub source: ArcDynSource,
    pub sink: ArcDynSink,
    pub provisioner: ArcDynProvisioner,
    pub catalog: ArcDynCatalog,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogReport {
    pub name: String,
    pub status: Ensured,
}

/// Everything a successful invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub container: String,
    pub container_status: ContainerStatus,
    pub export: ExportSummary,
    pub database: CatalogReport,
    pub crawler: CatalogReport,
    pub crawl: CrawlOutcome,
}

pub struct Pipeline {
    cfg: RunConfiguration,
    services: Services,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(cfg: RunConfiguration, services: Services) -> Self {
        Self {
            cfg,
            services,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.cfg
    }

    /// Run every stage in order. `now` stamps the history keys and lease.
    ///
    /// The lease, when enabled, is released whether or not the run
    /// succeeded.
    pub async fn run(
        &self,
        now: DateTime<Utc>,
    ) -> PipelineResult<PipelineReport> {
        let result = self.run_stages(now).await;

        let outcome = match &result {
            Ok(report) => report.crawl.status.as_str(),
            Err(e) => e.kind(),
        };
        counter!("analitica_runs_total", "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            error!(kind = e.kind(), error = %e, "pipeline run failed");
        }
        result
    }

    async fn run_stages(
        &self,
        now: DateTime<Utc>,
    ) -> PipelineResult<PipelineReport> {
        let cfg = &self.cfg;
        let svc = &self.services;

        let container_status = ensure_container(
            svc.provisioner.as_ref(),
            &cfg.bucket,
            &cfg.region,
        )
        .await?;

        let lease = match cfg.lease {
            Some(lease_cfg) => Some(
                RunLease::acquire(
                    svc.sink.clone(),
                    &cfg.glue_crawler,
                    lease_cfg.ttl,
                    now,
                )
                .await?,
            ),
            None => None,
        };

        let result = self.run_leased(container_status, now).await;

        if let Some(lease) = lease {
            if let Err(e) = lease.release().await {
                warn!(error = %e, "failed to release run lease");
            }
        }
        result
    }

    async fn run_leased(
        &self,
        container_status: ContainerStatus,
        now: DateTime<Utc>,
    ) -> PipelineResult<PipelineReport> {
        let cfg = &self.cfg;
        let svc = &self.services;

        let export = TableExporter::new(
            svc.source.clone(),
            svc.sink.clone(),
            cfg.prefix.clone(),
        )
        .with_cancel(self.cancel.clone())
        .export_all(&cfg.tables, now)
        .await?;

        let db_def = database_definition(cfg);
        let database = ensure_database(svc.catalog.as_ref(), &db_def).await?;

        let crawler_def = crawler_definition(cfg);
        let crawler =
            ensure_crawler(svc.catalog.as_ref(), &crawler_def).await?;

        let crawl = CrawlerRunner::new(svc.catalog.clone(), cfg.timing)
            .with_cancel(self.cancel.clone())
            .run(&cfg.glue_crawler)
            .await?;

        info!(
            timestamp = %export.timestamp,
            records = export.total_records(),
            crawl = %crawl.status,
            "pipeline run finished"
        );

        Ok(PipelineReport {
            container: cfg.bucket.clone(),
            container_status,
            export,
            database: CatalogReport {
                name: db_def.name,
                status: database,
            },
            crawler: CatalogReport {
                name: crawler_def.name,
                status: crawler,
            },
            crawl,
        })
    }
}
