use analitica_config::ConfigError;
use analitica_core::encoding::EncodingError;
use analitica_core::{CatalogError, SinkError, SourceError};
use thiserror::Error;

/// Which resource a provisioning step was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Container,
    Database,
    Crawler,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resource::Container => "container",
            Resource::Database => "catalog database",
            Resource::Crawler => "crawler definition",
        })
    }
}

/// Export failure cause.
#[derive(Debug, Error)]
pub enum ExportFailure {
    #[error(transparent)]
    Scan(#[from] SourceError),

    #[error(transparent)]
    Encode(#[from] EncodingError),

    #[error(transparent)]
    Write(#[from] SinkError),
}

/// Provisioning failure cause.
#[derive(Debug, Error)]
pub enum ProvisionFailure {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("provisioning {resource} {name:?} failed: {source}")]
    Provisioning {
        resource: Resource,
        name: String,
        #[source]
        source: ProvisionFailure,
    },

    #[error("export of table {table:?} failed: {source}")]
    Export {
        table: String,
        #[source]
        source: ExportFailure,
    },

    #[error("crawler {crawler:?}: {source}")]
    CrawlerState {
        crawler: String,
        #[source]
        source: CatalogError,
    },

    #[error("run lease: {0}")]
    Lease(String),

    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn provisioning(
        resource: Resource,
        name: &str,
        source: impl Into<ProvisionFailure>,
    ) -> Self {
        PipelineError::Provisioning {
            resource,
            name: name.to_owned(),
            source: source.into(),
        }
    }

    pub(crate) fn export(table: &str, source: impl Into<ExportFailure>) -> Self {
        PipelineError::Export {
            table: table.to_owned(),
            source: source.into(),
        }
    }

    pub(crate) fn crawler(crawler: &str, source: CatalogError) -> Self {
        PipelineError::CrawlerState {
            crawler: crawler.to_owned(),
            source,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Provisioning { .. } => "provisioning",
            PipelineError::Export { .. } => "export",
            PipelineError::CrawlerState { .. } => "crawler_state",
            PipelineError::Lease(_) => "lease",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
