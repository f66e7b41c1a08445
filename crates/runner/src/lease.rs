//! Opt-in run lease stored in the destination container.
//!
//! The lease is a small JSON object created with put-if-absent semantics,
//! so two invocations for the same crawler cannot both hold it. A lease
//! past its expiry is treated as abandoned and replaced with a write
//! conditioned on the revision that was read, so only one of several
//! runs racing for an expired lease wins it.
//!
//! Leases live at the container root, outside the export prefix, so the
//! crawler never sees them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use analitica_core::{ObjectSink, ObjectVersion, PutObject};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, PipelineResult};

pub fn lease_key(crawler: &str) -> String {
    format!("_leases/{crawler}.json")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// A held run lease. Call [`release`](Self::release) when the run ends.
pub struct RunLease {
    sink: Arc<dyn ObjectSink>,
    key: String,
    holder: String,
}

impl std::fmt::Debug for RunLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLease")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .finish()
    }
}

fn lease_err(context: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Lease(format!("{context}: {err}"))
}

impl RunLease {
    /// Take the lease for `crawler`, replacing an expired one.
    pub async fn acquire(
        sink: Arc<dyn ObjectSink>,
        crawler: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> PipelineResult<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| lease_err("invalid ttl", e))?;
        let record = LeaseRecord {
            holder: Uuid::new_v4().to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let body = serde_json::to_vec(&record)
            .map_err(|e| lease_err("encode lease", e))?;

        let lease = Self {
            sink,
            key: lease_key(crawler),
            holder: record.holder.clone(),
        };

        if lease.try_create(&body).await? {
            info!(key = %lease.key, expires_at = %record.expires_at, "run lease acquired");
            return Ok(lease);
        }

        let acquired = match lease.current().await? {
            Some((held, _)) if held.expires_at > now => {
                return Err(PipelineError::Lease(format!(
                    "{} is held by {} until {}",
                    lease.key, held.holder, held.expires_at
                )));
            }
            Some((held, version)) => {
                warn!(
                    key = %lease.key,
                    holder = %held.holder,
                    expired_at = %held.expires_at,
                    "replacing expired run lease"
                );
                lease.try_replace(&body, &version).await?
            }
            // released between our create and read
            None => lease.try_create(&body).await?,
        };

        if acquired {
            info!(key = %lease.key, expires_at = %record.expires_at, "run lease acquired");
            Ok(lease)
        } else {
            Err(PipelineError::Lease(format!(
                "{} was taken by a concurrent run",
                lease.key
            )))
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Delete the lease if it is still ours.
    pub async fn release(self) -> PipelineResult<()> {
        match self.current().await? {
            Some((held, _)) if held.holder == self.holder => {
                self.sink
                    .delete_object(&self.key)
                    .await
                    .map_err(|e| lease_err("delete lease", e))?;
                info!(key = %self.key, "run lease released");
            }
            Some((held, _)) => {
                warn!(
                    key = %self.key,
                    holder = %held.holder,
                    "run lease taken over by another run, leaving it"
                );
            }
            None => {}
        }
        Ok(())
    }

    fn object(&self, body: &[u8]) -> PutObject {
        PutObject {
            key: self.key.clone(),
            body: Bytes::copy_from_slice(body),
            content_type: "application/json".to_owned(),
            metadata: BTreeMap::new(),
        }
    }

    async fn try_create(&self, body: &[u8]) -> PipelineResult<bool> {
        self.sink
            .put_object_if_absent(self.object(body))
            .await
            .map_err(|e| lease_err("write lease", e))
    }

    async fn try_replace(
        &self,
        body: &[u8],
        seen: &ObjectVersion,
    ) -> PipelineResult<bool> {
        if seen.e_tag.is_none() && seen.version.is_none() {
            return Err(PipelineError::Lease(format!(
                "{} has no revision to replace it against",
                self.key
            )));
        }
        self.sink
            .put_object_if_match(self.object(body), seen)
            .await
            .map_err(|e| lease_err("replace lease", e))
    }

    /// The stored record and the revision it was read at. Unreadable
    /// records count as expired.
    async fn current(
        &self,
    ) -> PipelineResult<Option<(LeaseRecord, ObjectVersion)>> {
        let Some(obj) = self
            .sink
            .get_object(&self.key)
            .await
            .map_err(|e| lease_err("read lease", e))?
        else {
            return Ok(None);
        };

        let record = match serde_json::from_slice::<LeaseRecord>(&obj.body) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %self.key, error = %e, "unreadable run lease");
                LeaseRecord {
                    holder: "unknown".to_owned(),
                    acquired_at: DateTime::<Utc>::MIN_UTC,
                    expires_at: DateTime::<Utc>::MIN_UTC,
                }
            }
        };
        Ok(Some((record, obj.version)))
    }
}
