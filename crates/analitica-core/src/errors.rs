use std::borrow::Cow;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("table not found: {table}")]
    TableNotFound { table: String },

    #[error("connection error: {details}")]
    Connect { details: Cow<'static, str> },

    #[error("permission error: {details}")]
    Permission { details: Cow<'static, str> },

    #[error("throttled: {details}")]
    Throttled { details: Cow<'static, str> },

    #[error("undecodable item: {details}")]
    Decode { details: Cow<'static, str> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection error: {details}")]
    Connect { details: Cow<'static, str> },

    #[error("permission error: {details}")]
    Permission { details: Cow<'static, str> },

    #[error("container not found: {container}")]
    ContainerNotFound { container: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: &'static str, name: String },

    /// A start or update request hit a crawler that is mid-crawl.
    #[error("crawler already running: {name}")]
    AlreadyRunning { name: String },

    #[error("permission error: {details}")]
    Permission { details: Cow<'static, str> },

    #[error("unexpected response: {details}")]
    Unexpected { details: Cow<'static, str> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CatalogError::AlreadyExists { .. })
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, CatalogError::AlreadyRunning { .. })
    }
}
