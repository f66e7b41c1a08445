//! Run configuration for the export pipeline.
//!
//! Everything is read from the process environment once per invocation and
//! frozen into a [`RunConfiguration`]. Loading goes through a lookup
//! function so tests can supply variables without touching the real
//! environment.
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `ANALITICA_TABLES` | yes | |
//! | `ANALITICA_S3_BUCKET` | yes | |
//! | `ANALITICA_GLUE_DATABASE` | yes | |
//! | `ANALITICA_GLUE_CRAWLER` | yes | |
//! | `AWS_ACCOUNT_ID` | unless `ANALITICA_GLUE_ROLE_ARN` is set | |
//! | `ANALITICA_GLUE_ROLE_ARN` | no | `arn:aws:iam::<account>:role/LabRole` |
//! | `AWS_REGION` | no | `us-east-1` |
//! | `ANALITICA_CRAWL_POLL_SECS` | no | 15 |
//! | `ANALITICA_CRAWL_TIMEOUT_SECS` | no | 600 |
//! | `ANALITICA_IDLE_TIMEOUT_SECS` | no | 600 |
//! | `ANALITICA_RUN_LEASE` | no | off |
//! | `ANALITICA_RUN_LEASE_TTL_SECS` | no | 1800 |

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

mod mapping;

pub use mapping::{TableEntry, TableMapping};

pub const ENV_TABLES: &str = "ANALITICA_TABLES";
pub const ENV_BUCKET: &str = "ANALITICA_S3_BUCKET";
pub const ENV_DATABASE: &str = "ANALITICA_GLUE_DATABASE";
pub const ENV_CRAWLER: &str = "ANALITICA_GLUE_CRAWLER";
pub const ENV_ROLE_ARN: &str = "ANALITICA_GLUE_ROLE_ARN";
pub const ENV_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_POLL_SECS: &str = "ANALITICA_CRAWL_POLL_SECS";
pub const ENV_CRAWL_TIMEOUT_SECS: &str = "ANALITICA_CRAWL_TIMEOUT_SECS";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "ANALITICA_IDLE_TIMEOUT_SECS";
pub const ENV_RUN_LEASE: &str = "ANALITICA_RUN_LEASE";
pub const ENV_RUN_LEASE_TTL_SECS: &str = "ANALITICA_RUN_LEASE_TTL_SECS";

/// Key prefix every exported object lives under.
pub const KEY_PREFIX: &str = "analitica/ingesta";

pub const DEFAULT_REGION: &str = "us-east-1";

/// Role name used when only the account id is given.
pub const DEFAULT_ROLE_NAME: &str = "LabRole";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not set")]
    Missing { var: &'static str },

    #[error(
        "ANALITICA_TABLES contains no valid logical=physical pairs \
         (expected e.g. `incidentes=Incidentes,usuarios=Usuarios`)"
    )]
    EmptyMapping,

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Timing knobs for the crawler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlTiming {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Limit for a started crawl to reach READY.
    pub crawl_timeout: Duration,
    /// Limit for a previous crawl to finish before ours starts.
    pub idle_timeout: Duration,
}

impl Default for CrawlTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            crawl_timeout: Duration::from_secs(600),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Opt-in run lease guarding against overlapping invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseConfig {
    /// A lease older than this is considered abandoned.
    pub ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1800),
        }
    }
}

/// Immutable configuration for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfiguration {
    pub tables: TableMapping,
    /// Destination bucket.
    pub bucket: String,
    pub prefix: String,
    pub glue_database: String,
    pub glue_crawler: String,
    /// Execution role assumed by the crawler.
    pub glue_role: String,
    pub region: String,
    pub timing: CrawlTiming,
    /// `None` when the run lease is disabled.
    pub lease: Option<LeaseConfig>,
}

impl RunConfiguration {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` as the environment. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let require = |var: &'static str| {
            get(var).ok_or(ConfigError::Missing { var })
        };

        let tables = TableMapping::parse(&require(ENV_TABLES)?)?;

        let glue_role = match get(ENV_ROLE_ARN) {
            Some(arn) => arn,
            None => role_arn_for(&require(ENV_ACCOUNT_ID)?),
        };

        let defaults = CrawlTiming::default();
        let timing = CrawlTiming {
            poll_interval: secs(&get, ENV_POLL_SECS, defaults.poll_interval)?,
            crawl_timeout: secs(
                &get,
                ENV_CRAWL_TIMEOUT_SECS,
                defaults.crawl_timeout,
            )?,
            idle_timeout: secs(
                &get,
                ENV_IDLE_TIMEOUT_SECS,
                defaults.idle_timeout,
            )?,
        };

        let lease_enabled = match get(ENV_RUN_LEASE) {
            Some(raw) => parse_flag(ENV_RUN_LEASE, &raw)?,
            None => false,
        };
        let lease = if lease_enabled {
            Some(LeaseConfig {
                ttl: secs(
                    &get,
                    ENV_RUN_LEASE_TTL_SECS,
                    LeaseConfig::default().ttl,
                )?,
            })
        } else {
            None
        };

        let cfg = Self {
            tables,
            bucket: require(ENV_BUCKET)?,
            prefix: KEY_PREFIX.to_owned(),
            glue_database: require(ENV_DATABASE)?,
            glue_crawler: require(ENV_CRAWLER)?,
            glue_role,
            region: get(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.into()),
            timing,
            lease,
        };

        debug!(config = ?cfg, "run configuration loaded");
        Ok(cfg)
    }

    /// Object-store URL the crawler scans: `s3://<bucket>/<prefix>`.
    pub fn crawler_target(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Default crawler role for an account.
pub fn role_arn_for(account_id: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{DEFAULT_ROLE_NAME}")
}

fn secs<G>(
    get: &G,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(var) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be greater than zero",
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(_) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a whole number of seconds",
        }),
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_owned(),
            reason: "expected true/false",
        }),
    }
}
