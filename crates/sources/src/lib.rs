//! Table sources for the export pipeline.
//!
//! Every source implements [`analitica_core::TableSource`]: a paginated
//! full scan driven by an opaque cursor.
//!
//! # Available Sources
//!
//! - **Memory**: items held in process, split into fixed-size pages
//! - **DynamoDB** (feature `aws`): `Scan` with `ExclusiveStartKey`

pub mod memory;

#[cfg(feature = "aws")]
pub mod dynamodb;

pub use memory::MemTableSource;

#[cfg(feature = "aws")]
pub use dynamodb::DynamoDbSource;
