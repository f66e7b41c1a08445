pub mod catalog_ensure;
pub mod crawler_runner;
pub mod errors;
pub mod exporter;
pub mod lease;
pub mod pipeline;
pub mod provisioner;
pub mod version;

pub use catalog_ensure::{Ensured, ensure_crawler, ensure_database};
pub use crawler_runner::CrawlerRunner;
pub use errors::{PipelineError, PipelineResult, Resource};
pub use exporter::{TableExporter, history_key, latest_key};
pub use lease::{RunLease, lease_key};
pub use pipeline::{CatalogReport, Pipeline, PipelineReport, Services};
pub use provisioner::{ContainerStatus, ensure_container};
