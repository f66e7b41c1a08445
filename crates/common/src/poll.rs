//! Polling utilities for loops that wait on an external service.
//!
//! Long-running external jobs give no push notification when they finish,
//! so callers sleep and re-check. This module keeps the waiting part of
//! those loops in one place:
//!
//! - [`PollPolicy`]: delay between checks
//! - [`Deadline`]: monotonic elapsed-time tracking against a limit
//! - [`sleep_cancellable`]: a sleep that returns early on cancellation
//!
//! All waits go through tokio's timer, so tests can drive them with paused
//! virtual time.
//!
//! # Example
//!
//! ```ignore
//! use common::poll::{Deadline, PollPolicy, sleep_cancellable};
//!
//! let mut policy = PollPolicy::fixed(Duration::from_secs(15));
//! let deadline = Deadline::start(Duration::from_secs(600));
//!
//! while !deadline.expired() {
//!     if sleep_cancellable(&cancel, policy.next_delay()).await.is_cancelled() {
//!         return Err(MyError::Cancelled);
//!     }
//!     if job_done().await? {
//!         return Ok(());
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// Poll Policy
// =============================================================================

/// Delay schedule between consecutive polls.
///
/// Status polling uses a constant interval; the schedule is a type of its
/// own so loops ask it for the next delay instead of holding a raw
/// duration.
#[derive(Clone, Debug)]
pub struct PollPolicy {
    interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(15))
    }
}

impl PollPolicy {
    /// Poll at a constant interval.
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }

    /// The delay before the next poll.
    pub fn next_delay(&mut self) -> Duration {
        self.interval
    }
}

// =============================================================================
// Deadline
// =============================================================================

/// Elapsed-time tracker against a fixed limit.
///
/// Uses `tokio::time::Instant` so paused-time tests advance it together with
/// the sleeps.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Start tracking now.
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time elapsed since [`start`](Self::start).
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `true` once the elapsed time reaches the limit.
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.limit
    }
}

// =============================================================================
// Cancellable Sleep
// =============================================================================

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The full duration elapsed.
    Elapsed,
    /// The token fired first.
    Cancelled,
}

impl Wait {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// An already-cancelled token returns immediately.
pub async fn sleep_cancellable(
    cancel: &CancellationToken,
    duration: Duration,
) -> Wait {
    if cancel.is_cancelled() {
        return Wait::Cancelled;
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("cancelled while waiting");
            Wait::Cancelled
        }
        _ = sleep(duration) => Wait::Elapsed,
    }
}

// =============================================================================
// Tests
// =============================================================================
