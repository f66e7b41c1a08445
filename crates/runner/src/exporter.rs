//! Full-table export into history and latest snapshot objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use analitica_config::TableMapping;
use analitica_core::encoding::JsonLines;
use analitica_core::{
    ExportResult, ExportSummary, Item, ObjectSink, PutObject, TableSource,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{PipelineError, PipelineResult};

/// Append-only key for one run:
/// `<prefix>/history/<logical>/<ts>/<logical>.jsonl`.
pub fn history_key(prefix: &str, logical: &str, timestamp: &str) -> String {
    format!("{prefix}/history/{logical}/{timestamp}/{logical}.jsonl")
}

/// Stable key overwritten by every run: `<prefix>/<logical>/<logical>.jsonl`.
pub fn latest_key(prefix: &str, logical: &str) -> String {
    format!("{prefix}/{logical}/{logical}.jsonl")
}

pub struct TableExporter {
    source: Arc<dyn TableSource>,
    sink: Arc<dyn ObjectSink>,
    prefix: String,
    encoder: JsonLines,
    cancel: CancellationToken,
}

impl TableExporter {
    pub fn new(
        source: Arc<dyn TableSource>,
        sink: Arc<dyn ObjectSink>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            prefix: prefix.into(),
            encoder: JsonLines,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort between scan pages once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Export every mapped table, in mapping order, under one run timestamp.
    ///
    /// Stops at the first failure. Objects already written stay in place.
    pub async fn export_all(
        &self,
        tables: &TableMapping,
        at: DateTime<Utc>,
    ) -> PipelineResult<ExportSummary> {
        let timestamp = common::run_timestamp(at);
        info!(
            %timestamp,
            container = self.sink.container(),
            prefix = %self.prefix,
            tables = tables.len(),
            "export starting"
        );

        let mut exports = Vec::with_capacity(tables.len());
        for entry in tables.iter() {
            let result = self
                .export_table(&entry.logical, &entry.physical, &timestamp)
                .await?;
            exports.push(result);
        }

        let summary = ExportSummary { timestamp, exports };
        info!(
            timestamp = %summary.timestamp,
            tables = summary.exports.len(),
            records = summary.total_records(),
            "export finished"
        );
        Ok(summary)
    }

    /// Scan one table and write both snapshots. History is written first.
    pub async fn export_table(
        &self,
        logical: &str,
        physical: &str,
        timestamp: &str,
    ) -> PipelineResult<ExportResult> {
        let started = Instant::now();

        let items = self.scan_all(physical).await?;
        let body = self
            .encoder
            .encode(&items)
            .map_err(|e| PipelineError::export(physical, e))?;

        let history = history_key(&self.prefix, logical, timestamp);
        let latest = latest_key(&self.prefix, logical);
        let metadata = BTreeMap::from([
            ("timestamp".to_owned(), timestamp.to_owned()),
            ("table".to_owned(), physical.to_owned()),
            ("records".to_owned(), items.len().to_string()),
        ]);

        for key in [&history, &latest] {
            self.write(physical, key, body.clone(), metadata.clone())
                .await?;
        }

        counter!("analitica_export_records_total", "table" => logical.to_owned())
            .increment(items.len() as u64);
        histogram!(
            "analitica_stage_latency_seconds",
            "stage" => "export",
            "table" => logical.to_owned()
        )
        .record(started.elapsed().as_secs_f64());

        info!(
            logical,
            table = physical,
            records = items.len(),
            history_key = %history,
            latest_key = %latest,
            "table exported"
        );

        Ok(ExportResult {
            logical: logical.to_owned(),
            table: physical.to_owned(),
            records: items.len(),
            latest_key: latest,
            history_key: history,
        })
    }

    /// Follow the cursor until the source reports no continuation.
    async fn scan_all(&self, table: &str) -> PipelineResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut cursor = None;
        let mut pages = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let page = self
                .source
                .scan_page(table, cursor)
                .await
                .map_err(|e| PipelineError::export(table, e))?;
            pages += 1;
            items.extend(page.items);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        counter!("analitica_scan_pages_total", "table" => table.to_owned())
            .increment(pages);
        debug!(table, pages, records = items.len(), "table scanned");
        Ok(items)
    }

    async fn write(
        &self,
        table: &str,
        key: &str,
        body: Bytes,
        metadata: BTreeMap<String, String>,
    ) -> PipelineResult<()> {
        let size = body.len() as u64;
        self.sink
            .put_object(PutObject {
                key: key.to_owned(),
                body,
                content_type: self.encoder.content_type().to_owned(),
                metadata,
            })
            .await
            .map_err(|e| PipelineError::export(table, e))?;

        counter!("analitica_export_objects_total").increment(1);
        counter!("analitica_export_bytes_total").increment(size);
        Ok(())
    }
}
