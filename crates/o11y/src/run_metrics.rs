use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing::info;

use crate::O11yError;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
static INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct Config {
    pub enable: bool,
    /// Serve `/metrics` while the run is in progress. A batch run is short,
    /// so this is off unless asked for; the final snapshot is available via
    /// [`render`] either way when no listener is configured.
    pub http_listener: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable: true,
            http_listener: None,
        }
    }
}

/// Install the Prometheus recorder. Later calls are no-ops.
///
/// With an `http_listener` this must run inside a tokio runtime.
pub fn init(cfg: &Config) -> Result<(), O11yError> {
    if !cfg.enable {
        return Ok(());
    }

    INSTALLED.get_or_try_init(|| match cfg.http_listener {
        Some(addr) => {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| O11yError::Metrics(e.to_string()))?;
            info!(%addr, "metrics listener installed");
            Ok::<(), O11yError>(())
        }
        None => {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| O11yError::Metrics(e.to_string()))?;
            HANDLE.set(handle).ok();
            Ok(())
        }
    })?;

    describe_metrics();
    Ok(())
}

/// Render the current metrics snapshot in Prometheus text format.
///
/// `None` when the recorder is not installed or is owned by the HTTP
/// listener.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn describe_metrics() {
    describe_counter!(
        "analitica_runs_total",
        Unit::Count,
        "Pipeline invocations by final result"
    );
    describe_counter!(
        "analitica_scan_pages_total",
        Unit::Count,
        "Scan pages fetched from source tables"
    );
    describe_counter!(
        "analitica_export_records_total",
        Unit::Count,
        "Records exported per logical table"
    );
    describe_counter!(
        "analitica_export_objects_total",
        Unit::Count,
        "Snapshot objects written (history and latest)"
    );
    describe_counter!(
        "analitica_export_bytes_total",
        Unit::Bytes,
        "Serialized snapshot bytes written"
    );
    describe_counter!(
        "analitica_crawler_polls_total",
        Unit::Count,
        "Crawler status polls issued"
    );
    describe_counter!(
        "analitica_crawl_outcomes_total",
        Unit::Count,
        "Crawl runs by terminal classification"
    );
    describe_counter!(
        "analitica_panics_total",
        Unit::Count,
        "Panics captured by the hook"
    );
    describe_histogram!(
        "analitica_stage_latency_seconds",
        Unit::Seconds,
        "Latency per pipeline stage"
    );
}
