//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names stable between the engine boundary,
//! the core debug events and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";
pub const FIELD_SPAN_ID: &str = "span_id";

// Graph identifiers
pub const FIELD_NODE_ID: &str = "node_id";
pub const FIELD_RELATION: &str = "relation";
pub const FIELD_ENTITY_TYPE: &str = "entity_type";

// Change counts
pub const FIELD_ADDED: &str = "added";
pub const FIELD_MODIFIED: &str = "modified";
pub const FIELD_DELETED: &str = "deleted";
pub const FIELD_DELTA_LEN: &str = "delta_len";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
