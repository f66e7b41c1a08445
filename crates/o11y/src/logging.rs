//! Process-wide `tracing` subscriber.
//!
//! The AWS SDK and its HTTP stack log every request at `debug`, which
//! buries the pipeline's own events, so they are capped at `warn` unless
//! the filter names them explicitly.

use once_cell::sync::OnceCell;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt,
};

use crate::O11yError;

static INIT: OnceCell<()> = OnceCell::new();

/// Targets quieted unless the filter mentions them.
const NOISY_TARGETS: &[&str] = &[
    "aws_config",
    "aws_smithy_runtime",
    "aws_smithy_runtime_api",
    "hyper",
    "hyper_util",
    "rustls",
];

#[derive(Clone, Debug)]
pub struct Config {
    /// A bare level ("info") or a full filter directive
    /// ("info,runner=debug").
    pub level: Option<String>,
    /// JSON lines for log shipping, text for terminals.
    pub json: bool,
    pub with_targets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: Some("info".to_owned()),
            json: true,
            with_targets: false,
        }
    }
}

/// `level` plus a `warn` cap for every noisy target it does not mention.
pub fn filter_directives(level: &str) -> String {
    let mut directives = level.trim().to_owned();
    if directives.is_empty() {
        directives.push_str("info");
    }
    for target in NOISY_TARGETS {
        let named = directives
            .split(',')
            .any(|d| d.split('=').next() == Some(*target));
        if !named {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    directives
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` replaces the configured level entirely when set.
pub fn init(cfg: &Config) -> Result<(), O11yError> {
    INIT.get_or_try_init(|| {
        let _ = LogTracer::init();

        let directives =
            filter_directives(cfg.level.as_deref().unwrap_or("info"));
        let filter = EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| EnvFilter::try_new(&directives))
            .map_err(|e| O11yError::Logging(format!("{directives:?}: {e}")))?;

        let layer = fmt::layer().with_target(cfg.with_targets);
        let layer = if cfg.json {
            layer.json().with_current_span(true).boxed()
        } else {
            layer.with_ansi(true).boxed()
        };

        tracing::subscriber::set_global_default(
            Registry::default().with(filter).with(layer),
        )
        .map_err(|e| O11yError::Logging(e.to_string()))
    })?;
    Ok(())
}
