use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use analitica_config::RunConfiguration;
use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use catalog::GlueCatalog;
use clap::Parser;
use runner::version::{VERSION, startup_banner};
use runner::{Pipeline, Services};
use sinks::{LocalContainerProvisioner, ObjectStoreSink, S3BucketProvisioner};
use sources::DynamoDbSource;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Export key-value tables to the object store and refresh the catalog.
#[derive(Parser, Debug)]
#[command(name = "analitica", version = VERSION)]
struct Args {
    /// Emit logs as JSON lines.
    #[arg(long, env = "ANALITICA_JSON_LOGS")]
    json_logs: bool,

    /// Level or EnvFilter directive, e.g. `info,aws_config=warn`.
    #[arg(long, env = "ANALITICA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this address while the run is active.
    #[arg(long, env = "ANALITICA_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Write snapshots under this directory instead of the S3 bucket.
    #[arg(long, env = "ANALITICA_LOCAL_ROOT")]
    local_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let o11y_cfg = o11y::O11yConfig {
        logging: o11y::logging::Config {
            level: Some(args.log_level.clone()),
            json: args.json_logs,
            with_targets: false,
        },
        metrics: o11y::run_metrics::Config {
            enable: true,
            http_listener: args.metrics_addr,
        },
        install_panic_hook: true,
    };
    if let Err(e) = o11y::init_all(&o11y_cfg) {
        eprintln!("observability init failed: {e}");
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        // export kept, crawl did not succeed
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!(error = ?e, "analitica run failed");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the crawl finished without succeeding.
async fn run(args: Args) -> Result<bool> {
    info!("{}", startup_banner());

    let cfg = RunConfiguration::from_env().context("load configuration")?;
    info!(
        tables = cfg.tables.len(),
        bucket = %cfg.bucket,
        database = %cfg.glue_database,
        crawler = %cfg.glue_crawler,
        region = %cfg.region,
        lease = cfg.lease.is_some(),
        "configuration loaded"
    );

    let aws = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(cfg.region.clone()))
        .load()
        .await;

    let services = match &args.local_root {
        Some(root) => {
            info!(root = %root.display(), "writing to local directory");
            Services {
                source: Arc::new(DynamoDbSource::from_conf(&aws)),
                sink: Arc::new(
                    ObjectStoreSink::local(root, cfg.bucket.as_str())
                        .context("open local sink")?,
                ),
                provisioner: Arc::new(LocalContainerProvisioner::new(
                    root.clone(),
                )),
                catalog: Arc::new(GlueCatalog::from_conf(&aws)),
            }
        }
        None => Services {
            source: Arc::new(DynamoDbSource::from_conf(&aws)),
            sink: Arc::new(
                ObjectStoreSink::s3(&cfg.bucket, &cfg.region)
                    .context("open s3 sink")?,
            ),
            provisioner: Arc::new(S3BucketProvisioner::from_conf(&aws)),
            catalog: Arc::new(GlueCatalog::from_conf(&aws)),
        },
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let report = Pipeline::new(cfg, services)
        .with_cancel(cancel)
        .run(chrono::Utc::now())
        .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("encode report")?
    );

    if let Some(snapshot) = o11y::run_metrics::render() {
        tracing::debug!(metrics = %snapshot, "final metrics");
    }

    Ok(report.crawl.is_success())
}
