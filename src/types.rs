//! Common types used throughout the pipeline
//!
//! Shared type aliases for the semi-structured record model.

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// A single event record: an open mapping of field name to JSON value
pub type Record = JsonObject;

/// Default number of records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Field dropped from every record before encoding
pub const DEFAULT_DROP_FIELD: &str = "payload";
