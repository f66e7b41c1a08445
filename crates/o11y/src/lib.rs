pub mod logging;
pub mod run_metrics;
pub mod panic;

use thiserror::Error;

/// Failure while installing a global observability component.
#[derive(Debug, Error)]
pub enum O11yError {
    #[error("tracing subscriber: {0}")]
    Logging(String),

    #[error("metrics recorder: {0}")]
    Metrics(String),
}

/// Top-level config for observability.
#[derive(Clone, Debug)]
pub struct O11yConfig {
    pub logging: logging::Config,
    pub metrics: run_metrics::Config,
    pub install_panic_hook: bool,
}

impl Default for O11yConfig {
    fn default() -> Self {
        Self {
            logging: logging::Config::default(),
            metrics: run_metrics::Config::default(),
            install_panic_hook: true,
        }
    }
}

pub fn init_all(cfg: &O11yConfig) -> Result<(), O11yError> {
    logging::init(&cfg.logging)?;
    run_metrics::init(&cfg.metrics)?;
    if cfg.install_panic_hook {
        panic::install_hook();
    }
    Ok(())
}
