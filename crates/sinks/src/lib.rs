//! Object-store sinks and container provisioners.
//!
//! Snapshots are written through [`analitica_core::ObjectSink`]; the
//! container they land in is created up front through
//! [`analitica_core::ContainerProvisioner`].
//!
//! # Available Backends
//!
//! - **Memory**: `object_store::memory::InMemory`, for tests
//! - **Local**: one directory per container under a root
//! - **S3** (feature `aws`): `object_store` S3 store for writes and
//!   `aws-sdk-s3` for bucket provisioning
//!
//! [`FaultySink`] wraps any of them to refuse writes to chosen keys.
//!
//! # Example
//!
//! ```ignore
//! use sinks::{LocalContainerProvisioner, ObjectStoreSink};
//!
//! let sink = ObjectStoreSink::local("/var/lib/analitica", "exports")?;
//! let provisioner = LocalContainerProvisioner::new("/var/lib/analitica");
//! ```

pub mod fault;
pub mod provision;
pub mod store;

#[cfg(feature = "aws")]
pub mod s3;

pub use fault::FaultySink;
pub use provision::{LocalContainerProvisioner, MemContainerProvisioner};
pub use store::{ObjectStoreSink, local_container_dir};

#[cfg(feature = "aws")]
pub use s3::S3BucketProvisioner;
