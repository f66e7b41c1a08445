//! Catalog service backends.
//!
//! Provides the [`analitica_core::CatalogService`] implementations the
//! runner provisions databases and drives crawls through.
//!
//! - [`MemCatalog`]: in-process catalog with scriptable crawl progress
//! - `GlueCatalog` (feature `aws`): AWS Glue Data Catalog and crawlers

mod memory;

#[cfg(feature = "aws")]
mod glue;

pub use memory::{CatalogOp, CrawlStep, MemCatalog};

#[cfg(feature = "aws")]
pub use glue::GlueCatalog;
