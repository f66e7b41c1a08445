//! Shared utilities for the analitica export pipeline.
//!
//! - **Polling**: cancellable waits, fixed poll schedules and deadline
//!   tracking for loops that wait on an external service
//! - **Time Utilities**: run timestamps embedded in history keys
//!
//! # Quick Start
//!
//! ```ignore
//! use common::{Deadline, PollPolicy, Wait, sleep_cancellable};
//!
//! let mut policy = PollPolicy::fixed(Duration::from_secs(15));
//! let deadline = Deadline::start(Duration::from_secs(600));
//!
//! loop {
//!     if sleep_cancellable(&cancel, policy.next_delay()).await.is_cancelled() {
//!         break;
//!     }
//!     if job_done().await? || deadline.expired() {
//!         break;
//!     }
//! }
//! ```

pub mod poll;
pub mod time;

// =============================================================================
// Polling
// =============================================================================

pub use poll::{Deadline, PollPolicy, Wait, sleep_cancellable};

// =============================================================================
// Time Utilities
// =============================================================================

pub use time::{RUN_TIMESTAMP_FORMAT, run_timestamp};
