use std::sync::Arc;

use analitica_config::RunConfiguration;
use analitica_core::{
    AttrValue, CatalogError, CrawlStatus, CrawlerDefinition, Item,
    ObjectSink, item,
};
use catalog::{CatalogOp, CrawlStep, MemCatalog};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use runner::catalog_ensure::crawler_definition;
use runner::{
    ContainerStatus, Ensured, Pipeline, PipelineError, Services, lease_key,
};
use sinks::{
    FaultySink, LocalContainerProvisioner, MemContainerProvisioner,
    ObjectStoreSink,
};
use sources::MemTableSource;

const TABLES: &str = "incidentes=Incidentes,usuarios=Usuarios";

/// `extra` entries shadow the defaults.
fn config_with(extra: &[(&str, &str)]) -> RunConfiguration {
    let mut vars = extra.to_vec();
    vars.extend_from_slice(&[
        ("ANALITICA_TABLES", TABLES),
        ("ANALITICA_S3_BUCKET", "analitica-bucket"),
        ("ANALITICA_GLUE_DATABASE", "analitica_db"),
        ("ANALITICA_GLUE_CRAWLER", "analitica_crawler"),
        ("AWS_ACCOUNT_ID", "123456789012"),
    ]);
    RunConfiguration::from_lookup(|k| {
        vars.iter().find(|(n, _)| *n == k).map(|(_, v)| v.to_string())
    })
    .unwrap()
}

fn config() -> RunConfiguration {
    config_with(&[])
}

fn incidents(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            item([
                ("id", AttrValue::from(format!("inc-{i:03}"))),
                ("piso", AttrValue::from(i as i64 % 7)),
                ("abierto", AttrValue::from(i % 2 == 0)),
            ])
        })
        .collect()
}

fn users() -> Vec<Item> {
    ["ana", "bruno", "carla"]
        .into_iter()
        .map(|u| item([("usuario", AttrValue::from(u))]))
        .collect()
}

fn source() -> Arc<MemTableSource> {
    Arc::new(
        MemTableSource::new(25)
            .with_table("Incidentes", incidents(60))
            .with_table("Usuarios", users()),
    )
}

struct Harness {
    source: Arc<MemTableSource>,
    sink: Arc<ObjectStoreSink>,
    provisioner: Arc<MemContainerProvisioner>,
    catalog: Arc<MemCatalog>,
}

impl Harness {
    fn new(catalog: MemCatalog) -> Self {
        Self {
            source: source(),
            sink: Arc::new(ObjectStoreSink::in_memory("analitica-bucket")),
            provisioner: Arc::new(MemContainerProvisioner::new()),
            catalog: Arc::new(catalog),
        }
    }

    /// Catalog with the crawler already defined so crawl steps can be
    /// scripted up front.
    fn with_crawler(steps: Vec<CrawlStep>) -> Self {
        let catalog =
            MemCatalog::new().with_crawler(crawler_definition(&config()));
        catalog.script_crawl("analitica_crawler", steps);
        Self::new(catalog)
    }

    fn services(&self) -> Services {
        Services {
            source: self.source.clone(),
            sink: self.sink.clone(),
            provisioner: self.provisioner.clone(),
            catalog: self.catalog.clone(),
        }
    }

    fn pipeline(&self, cfg: RunConfiguration) -> Pipeline {
        Pipeline::new(cfg, self.services())
    }
}

fn at(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, secs).unwrap()
}

#[tokio::test(start_paused = true)]
async fn full_run_exports_every_page_and_reports_counts() {
    // ensure_crawler observes one step, the runner's initial fetch another
    let h = Harness::with_crawler(vec![
        CrawlStep::ready(None),
        CrawlStep::ready(None),
        CrawlStep::running(),
        CrawlStep::running(),
        CrawlStep::succeeded(2, 1, 0),
    ]);

    let report = h.pipeline(config()).run(at(0)).await.unwrap();

    assert_eq!(report.container_status, ContainerStatus::Created);
    assert_eq!(
        h.provisioner.created(),
        vec![("analitica-bucket".into(), "us-east-1".into())]
    );
    assert_eq!(report.export.timestamp, "20240603T080000Z");
    assert_eq!(report.export.exports.len(), 2);
    assert_eq!(report.export.exports[0].logical, "incidentes");
    assert_eq!(report.export.exports[0].records, 60);
    assert_eq!(report.export.exports[1].records, 3);
    // 3 pages for the 60 incidents, 1 for the users
    assert_eq!(h.source.scan_calls(), 4);

    let latest = h
        .sink
        .get_object("analitica/ingesta/incidentes/incidentes.jsonl")
        .await
        .unwrap()
        .unwrap();
    let body = std::str::from_utf8(&latest.body).unwrap();
    assert_eq!(body.lines().count(), 60);
    assert!(body.starts_with(r#"{"abierto":true,"id":"inc-000","piso":0}"#));

    assert_eq!(report.database.status, Ensured::Created);
    assert_eq!(report.crawler.status, Ensured::Updated);
    assert_eq!(report.crawl.status, CrawlStatus::Succeeded);
    assert_eq!(report.crawl.tables_created, 2);
    assert_eq!(report.crawl.tables_updated, 1);
    assert_eq!(h.catalog.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_overwrite_latest_and_append_history() {
    let h = Harness::new(MemCatalog::new());

    let first = h.pipeline(config()).run(at(0)).await.unwrap();
    let second = h.pipeline(config()).run(at(30)).await.unwrap();

    let a = &first.export.exports[0];
    let b = &second.export.exports[0];
    assert_eq!(a.latest_key, b.latest_key);
    assert_ne!(a.history_key, b.history_key);

    let latest = h.sink.get_object(&b.latest_key).await.unwrap().unwrap();
    let history_a = h.sink.get_object(&a.history_key).await.unwrap().unwrap();
    let history_b = h.sink.get_object(&b.history_key).await.unwrap().unwrap();
    assert_eq!(latest.body, history_a.body);
    assert_eq!(history_a.body, history_b.body);

    assert_eq!(first.database.status, Ensured::Created);
    assert_eq!(second.database.status, Ensured::Existing);
    assert_eq!(first.crawler.status, Ensured::Created);
    assert_eq!(second.crawler.status, Ensured::Updated);
    assert_eq!(second.container_status, ContainerStatus::Existing);
    assert_eq!(h.catalog.count(CatalogOp::CreateDatabase), 1);
    assert_eq!(h.catalog.count(CatalogOp::CreateCrawler), 1);
}

#[tokio::test(start_paused = true)]
async fn crawl_stuck_running_times_out_without_failing_the_run() {
    let h = Harness::with_crawler(vec![
        CrawlStep::ready(None),
        CrawlStep::ready(None),
        CrawlStep::running(),
    ]);
    let started = tokio::time::Instant::now();

    let report = h.pipeline(config()).run(at(0)).await.unwrap();

    assert_eq!(report.crawl.status, CrawlStatus::Timeout);
    assert_eq!(
        report.crawl.error.as_deref(),
        Some("did not complete within 600s")
    );
    assert!(!report.crawl.is_success());
    assert!(started.elapsed() <= std::time::Duration::from_secs(615));
    // the export is kept
    assert!(
        h.sink
            .get_object("analitica/ingesta/usuarios/usuarios.jsonl")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn start_collision_is_tolerated() {
    let h = Harness::with_crawler(vec![
        CrawlStep::ready(None),
        CrawlStep::ready(None),
        CrawlStep::running(),
        CrawlStep::succeeded(0, 0, 0),
    ]);
    h.catalog.fail_next(
        CatalogOp::StartCrawler,
        CatalogError::AlreadyRunning {
            name: "analitica_crawler".into(),
        },
    );

    let report = h.pipeline(config()).run(at(0)).await.unwrap();

    assert_eq!(report.crawl.status, CrawlStatus::Succeeded);
    assert_eq!(h.catalog.starts(), 0);
    assert_eq!(h.catalog.count(CatalogOp::StartCrawler), 1);
}

#[tokio::test(start_paused = true)]
async fn busy_crawler_is_awaited_before_starting() {
    // busy from the first look: the definition cannot be updated mid-crawl
    let h = Harness::with_crawler(vec![
        CrawlStep::running(),
        CrawlStep::running(),
        CrawlStep::running(),
        CrawlStep::ready(None),
        CrawlStep::running(),
        CrawlStep::succeeded(1, 0, 0),
    ]);

    let report = h.pipeline(config()).run(at(0)).await.unwrap();

    assert_eq!(report.crawler.status, Ensured::Existing);
    assert_eq!(h.catalog.count(CatalogOp::UpdateCrawler), 1);
    assert_eq!(report.crawl.status, CrawlStatus::Succeeded);
    assert_eq!(report.crawl.tables_created, 1);
    assert_eq!(h.catalog.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_source_table_stops_before_catalog_work() {
    let h = Harness::new(MemCatalog::new());
    let cfg = config_with(&[("ANALITICA_TABLES", "fantasma=NoExiste")]);

    let err = h.pipeline(cfg).run(at(0)).await.unwrap_err();

    assert!(
        matches!(err, PipelineError::Export { ref table, .. } if table == "NoExiste"),
        "{err}"
    );
    assert!(h.catalog.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_latest_write_keeps_history_and_skips_the_catalog() {
    let h = Harness::new(MemCatalog::new());
    let store = Arc::new(ObjectStoreSink::in_memory("analitica-bucket"));
    let sink = Arc::new(
        FaultySink::new(store.clone())
            .deny_writes_to("analitica/ingesta/incidentes/incidentes.jsonl"),
    );
    let services = Services {
        sink: sink.clone(),
        ..h.services()
    };

    let err = Pipeline::new(config(), services)
        .run(at(0))
        .await
        .unwrap_err();

    assert!(
        matches!(err, PipelineError::Export { ref table, .. } if table == "Incidentes"),
        "{err}"
    );
    let history =
        "analitica/ingesta/history/incidentes/20240603T080000Z/incidentes.jsonl";
    assert_eq!(sink.written(), vec![history.to_owned()]);
    assert!(store.get_object(history).await.unwrap().is_some());
    assert!(h.catalog.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lease_is_released_after_the_run() {
    let h = Harness::new(MemCatalog::new());
    let cfg = config_with(&[("ANALITICA_RUN_LEASE", "true")]);

    h.pipeline(cfg.clone()).run(at(0)).await.unwrap();

    let key = lease_key(&cfg.glue_crawler);
    assert!(!key.starts_with(&cfg.prefix));
    assert!(h.sink.get_object(&key).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn live_lease_blocks_a_second_run() {
    let h = Harness::new(MemCatalog::new());
    let cfg = config_with(&[("ANALITICA_RUN_LEASE", "true")]);
    let ttl = cfg.lease.unwrap().ttl;

    let _held = runner::RunLease::acquire(
        h.sink.clone(),
        &cfg.glue_crawler,
        ttl,
        at(0),
    )
    .await
    .unwrap();

    let err = h.pipeline(cfg).run(at(30)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Lease(_)), "{err}");
    assert_eq!(h.source.scan_calls(), 0);
    assert!(h.catalog.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn local_directory_sink_writes_snapshot_files() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(
        ObjectStoreSink::local(dir.path(), "analitica-bucket").unwrap(),
    );
    let services = Services {
        source: source(),
        sink,
        provisioner: Arc::new(LocalContainerProvisioner::new(dir.path())),
        catalog: Arc::new(MemCatalog::new()),
    };

    let report = Pipeline::new(config(), services).run(at(0)).await.unwrap();

    assert_eq!(report.container_status, ContainerStatus::Created);
    let latest = dir
        .path()
        .join("analitica-bucket/analitica/ingesta/usuarios/usuarios.jsonl");
    let text = std::fs::read_to_string(latest).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn report_serializes_for_the_cli() {
    let def: CrawlerDefinition = crawler_definition(&config());
    assert_eq!(def.s3_targets, vec!["s3://analitica-bucket/analitica/ingesta"]);

    let status = serde_json::to_value(Ensured::Updated).unwrap();
    assert_eq!(status, serde_json::json!("updated"));
    let status = serde_json::to_value(ContainerStatus::Created).unwrap();
    assert_eq!(status, serde_json::json!("created"));
}
