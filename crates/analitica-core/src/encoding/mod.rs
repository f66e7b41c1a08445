//! Snapshot encoding.
//!
//! Items are written as JSON Lines: one JSON object per item, separated by
//! `\n`. Attribute values are mapped onto plain JSON so downstream crawlers
//! can infer a schema without knowing the source's type tags.
//!
//! # Number normalization
//!
//! Exact decimals become a JSON integer when they have no fractional part
//! and a JSON float (`f64`) otherwise. Values beyond `f64` precision lose
//! digits; integral values outside the `i64`/`u64` range are written as
//! floats as well.

mod json;

pub use json::{JsonLines, item_to_json, normalize_number};

/// Content type attached to every snapshot object.
pub const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

/// Encoding error.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
