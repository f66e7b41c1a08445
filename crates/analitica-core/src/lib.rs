//! Analitica Core Types
//!
//! This crate defines the item model, the service traits the export
//! pipeline talks to, and the result types it produces. Concrete backends
//! (in-memory, object store, AWS) live in the `sources`, `sinks` and
//! `catalog` crates; the pipeline only ever sees `Arc<dyn Trait>` handles
//! built once per process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

pub mod encoding;
pub mod errors;
pub mod item;

pub use errors::{CatalogError, SinkError, SourceError};
pub use item::{AttrValue, Item, item};

pub type SourceResult<T> = Result<T, SourceError>;
pub type SinkResult<T> = Result<T, SinkError>;
pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// Source Tables
// ============================================================================

/// Opaque continuation cursor returned by a paginated scan.
///
/// Holds the key of the last item evaluated; callers only pass it back.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCursor(Item);

impl ScanCursor {
    pub fn new(key: Item) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &Item {
        &self.0
    }

    pub fn into_key(self) -> Item {
        self.0
    }
}

/// One page of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// `None` when the scan is complete.
    pub next_cursor: Option<ScanCursor>,
}

#[async_trait]
pub trait TableSource: Send + Sync {
    /// Backend name for logs.
    fn kind(&self) -> &'static str;

    /// Fetch one page of `table`, starting after `cursor`.
    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<ScanCursor>,
    ) -> SourceResult<ScanPage>;
}

// ============================================================================
// Object Store
// ============================================================================

/// A write to the destination container.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    /// User metadata attached to the object.
    pub metadata: BTreeMap<String, String>,
}

/// An object read back from the destination container.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Revision that was read, for conditional overwrites.
    pub version: ObjectVersion,
}

/// Backend revision identifiers of one stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersion {
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Destination container (bucket) name.
    fn container(&self) -> &str;

    /// Create or overwrite an object.
    async fn put_object(&self, object: PutObject) -> SinkResult<()>;

    /// Create an object only if no object exists at the key.
    ///
    /// Returns `false` without writing when the key is taken.
    async fn put_object_if_absent(&self, object: PutObject) -> SinkResult<bool>;

    /// Overwrite an object only if it is still at revision `expected`.
    ///
    /// Returns `false` without writing when the object changed or
    /// disappeared since `expected` was read.
    async fn put_object_if_match(
        &self,
        object: PutObject,
        expected: &ObjectVersion,
    ) -> SinkResult<bool>;

    async fn get_object(&self, key: &str) -> SinkResult<Option<StoredObject>>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> SinkResult<()>;
}

#[async_trait]
pub trait ContainerProvisioner: Send + Sync {
    async fn container_exists(&self, container: &str) -> SinkResult<bool>;

    /// Create the container in `region`.
    async fn create_container(
        &self,
        container: &str,
        region: &str,
    ) -> SinkResult<()>;
}

// ============================================================================
// Catalog
// ============================================================================

/// Crawler lifecycle state as reported by the catalog service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlerState {
    Ready,
    Running,
    Stopping,
}

impl CrawlerState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "READY" => Some(Self::Ready),
            "RUNNING" => Some(Self::Running),
            "STOPPING" => Some(Self::Stopping),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of the crawler's most recent completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastCrawl {
    /// Raw status, e.g. `SUCCEEDED`, `FAILED`, `CANCELLED`.
    pub status: String,
    pub error_message: Option<String>,
    pub tables_created: u64,
    pub tables_updated: u64,
    pub tables_deleted: u64,
}

/// Point-in-time view of a crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerStatus {
    pub name: String,
    pub state: CrawlerState,
    pub last_crawl: Option<LastCrawl>,
}

/// Desired shape of a crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerDefinition {
    pub name: String,
    /// Execution role assumed by the crawler.
    pub role: String,
    pub database: String,
    /// Object-store paths the crawler scans.
    pub s3_targets: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDefinition {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub description: Option<String>,
}

/// Catalog and crawl service.
///
/// Lookups return `Ok(None)` for a missing entity so callers branch on
/// presence instead of on an error.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_database(&self, name: &str)
    -> CatalogResult<Option<DatabaseInfo>>;

    async fn create_database(&self, def: &DatabaseDefinition)
    -> CatalogResult<()>;

    async fn get_crawler(&self, name: &str)
    -> CatalogResult<Option<CrawlerStatus>>;

    async fn create_crawler(&self, def: &CrawlerDefinition)
    -> CatalogResult<()>;

    async fn update_crawler(&self, def: &CrawlerDefinition)
    -> CatalogResult<()>;

    /// Start a crawl. Fails with [`CatalogError::AlreadyRunning`] when a
    /// crawl is in progress.
    async fn start_crawler(&self, name: &str) -> CatalogResult<()>;
}

pub type ArcDynSource = Arc<dyn TableSource>;
pub type ArcDynSink = Arc<dyn ObjectSink>;
pub type ArcDynProvisioner = Arc<dyn ContainerProvisioner>;
pub type ArcDynCatalog = Arc<dyn CatalogService>;

// ============================================================================
// Export Results
// ============================================================================

/// Outcome of exporting one logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub logical: String,
    /// Source table name.
    pub table: String,
    pub records: usize,
    /// Overwritten every run.
    pub latest_key: String,
    /// Unique per run.
    pub history_key: String,
}

/// All tables exported by one run, in mapping order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Shared by every table of the run (`%Y%m%dT%H%M%SZ`).
    pub timestamp: String,
    pub exports: Vec<ExportResult>,
}

impl ExportSummary {
    pub fn total_records(&self) -> usize {
        self.exports.iter().map(|e| e.records).sum()
    }
}

// ============================================================================
// Crawl Outcome
// ============================================================================

/// Terminal classification of a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Succeeded,
    Failed,
    Cancelled,
    Timeout,
}

impl CrawlStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error text used when the service reports a failure without a message.
pub const NO_ERROR_MESSAGE: &str = "no error message reported";

/// Final result of a crawl run. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlOutcome {
    pub crawler: String,
    pub status: CrawlStatus,
    /// Status string as reported by the service, when one was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_status: Option<String>,
    pub tables_created: u64,
    pub tables_updated: u64,
    pub tables_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrawlOutcome {
    /// Classify the last run of a crawler that has returned to READY.
    pub fn from_last_crawl(crawler: &str, last: Option<&LastCrawl>) -> Self {
        let Some(last) = last else {
            return Self {
                crawler: crawler.to_owned(),
                status: CrawlStatus::Failed,
                reported_status: None,
                tables_created: 0,
                tables_updated: 0,
                tables_deleted: 0,
                error: Some(NO_ERROR_MESSAGE.to_owned()),
            };
        };

        let status = match last.status.as_str() {
            "SUCCEEDED" => CrawlStatus::Succeeded,
            "CANCELLED" => CrawlStatus::Cancelled,
            _ => CrawlStatus::Failed,
        };
        let error = match status {
            CrawlStatus::Succeeded => None,
            _ => Some(
                last.error_message
                    .clone()
                    .unwrap_or_else(|| NO_ERROR_MESSAGE.to_owned()),
            ),
        };

        Self {
            crawler: crawler.to_owned(),
            status,
            reported_status: Some(last.status.clone()),
            tables_created: last.tables_created,
            tables_updated: last.tables_updated,
            tables_deleted: last.tables_deleted,
            error,
        }
    }

    pub fn timeout(crawler: &str, error: String) -> Self {
        Self {
            crawler: crawler.to_owned(),
            status: CrawlStatus::Timeout,
            reported_status: None,
            tables_created: 0,
            tables_updated: 0,
            tables_deleted: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CrawlStatus::Succeeded
    }
}
