use graphdelta_core_types::{RequestId, TraceId};
use thiserror::Error;

use crate::model::RelationKind;

/// Result type alias using TrackError
pub type Result<T> = std::result::Result<T, TrackError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure the tracker can surface is classified into one of these
/// kinds. Each kind maps to a stable code for programmatic handling by
/// callers sitting on the other side of a process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Graph shape (fail fast, before any store interaction)
    UnsupportedGraphShape,
    NotFound,
    InvalidInput,

    // Reconciliation
    IdentifierMismatch,

    // Store outcomes
    ConcurrencyConflict,
    ConstraintViolation,
    Cancelled,

    // Integration
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::UnsupportedGraphShape => "ERR_UNSUPPORTED_GRAPH_SHAPE",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::IdentifierMismatch => "ERR_IDENTIFIER_MISMATCH",
            ExErrorKind::ConcurrencyConflict => "ERR_CONCURRENCY_CONFLICT",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Store outcomes the caller may fix and resubmit
    pub fn is_store_outcome(&self) -> bool {
        matches!(
            self,
            ExErrorKind::ConcurrencyConflict
                | ExErrorKind::ConstraintViolation
                | ExErrorKind::Cancelled
        )
    }
}

/// Canonical structured error type
///
/// Carries the classification plus the context needed to find the
/// offending node again (operation, node id, relation) and to correlate
/// the failure with the request that produced it.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    node_id: Option<String>,
    relation: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
    candidates: Option<Vec<String>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            node_id: None,
            relation: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
            candidates: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add node id context
    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Add relation context
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add candidate node ids (IdentifierMismatch carries the ambiguous matches)
    pub fn with_candidates(mut self, ids: Vec<String>) -> Self {
        self.candidates = Some(ids);
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    pub fn candidates(&self) -> Option<&[String]> {
        self.candidates.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(node_id) = &self.node_id {
            write!(f, " (node_id: {})", node_id)?;
        }
        if let Some(relation) = &self.relation {
            write!(f, " (relation: {})", relation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for tracking, extraction, apply and reconciliation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    // ===== Graph Shape Errors =====
    /// Node is not part of the graph
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// Relation ordinal is not declared by the entity schema
    #[error("Entity {entity} has no relation #{relation}")]
    UnknownRelation { entity: String, relation: u8 },

    /// Field ordinal is not declared by the entity schema
    #[error("Entity {entity} has no field #{field}")]
    UnknownField { entity: String, field: u8 },

    /// Collection operation on a single relation or the reverse
    #[error("Relation {entity}.{relation} is not a {expected:?} relation")]
    RelationKindMismatch {
        entity: String,
        relation: String,
        expected: RelationKind,
    },

    /// Node id already present in the graph
    #[error("Node {node_id} is already part of the graph")]
    DuplicateNode { node_id: String },

    /// Node is not a live member of the collection it was removed from
    #[error("Node {node_id} is not a member of relation {relation}")]
    NotAMember { node_id: String, relation: String },

    /// Single relation already owns a child
    #[error("Relation {relation} on node {node_id} already owns child {child_id}")]
    RelationOccupied {
        node_id: String,
        relation: String,
        child_id: String,
    },

    /// Graph violates a structural invariant or cannot be represented
    #[error("Unsupported graph shape: {reason}")]
    UnsupportedGraphShape { reason: String },

    // ===== Reconciliation Errors =====
    /// Node could not be correlated uniquely with the reconciled graph
    #[error("Identifier mismatch for node {node_id}: {reason}")]
    IdentifierMismatch {
        node_id: String,
        reason: String,
        candidates: Vec<String>,
    },

    // ===== Store Errors =====
    /// Store version stamp no longer matches
    #[error("Concurrency conflict on node {node_id}")]
    ConcurrencyConflict { node_id: String },

    /// Store rejected an insert, update or delete
    #[error("Constraint violation on node {node_id}: {reason}")]
    ConstraintViolation { node_id: String, reason: String },

    /// Commit was cancelled before it took effect
    #[error("Commit cancelled")]
    CommitCancelled,

    // ===== Generic Errors =====
    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrackError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        TrackError::UnsupportedGraphShape {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(node_id: &crate::model::NodeId) -> Self {
        TrackError::NodeNotFound {
            node_id: node_id.to_string(),
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            TrackError::NodeNotFound { .. } | TrackError::NotAMember { .. } => {
                ExErrorKind::NotFound
            }
            TrackError::UnknownRelation { .. }
            | TrackError::UnknownField { .. }
            | TrackError::RelationKindMismatch { .. }
            | TrackError::UnsupportedGraphShape { .. } => ExErrorKind::UnsupportedGraphShape,
            TrackError::DuplicateNode { .. } | TrackError::RelationOccupied { .. } => {
                ExErrorKind::InvalidInput
            }
            TrackError::IdentifierMismatch { .. } => ExErrorKind::IdentifierMismatch,
            TrackError::ConcurrencyConflict { .. } => ExErrorKind::ConcurrencyConflict,
            TrackError::ConstraintViolation { .. } => ExErrorKind::ConstraintViolation,
            TrackError::CommitCancelled => ExErrorKind::Cancelled,
            TrackError::Serialization { .. } => ExErrorKind::Serialization,
            TrackError::Internal { .. } => ExErrorKind::Internal,
        }
    }
}

/// Conversion from TrackError to ExError
///
/// Classifies the error and lifts its context into the structured fields.
impl From<TrackError> for ExError {
    fn from(err: TrackError) -> Self {
        let base = ExError::new(err.kind()).with_message(err.to_string());
        match err {
            TrackError::NodeNotFound { node_id }
            | TrackError::DuplicateNode { node_id }
            | TrackError::ConcurrencyConflict { node_id }
            | TrackError::ConstraintViolation { node_id, .. } => base.with_node_id(node_id),
            TrackError::NotAMember { node_id, relation } => {
                base.with_node_id(node_id).with_relation(relation)
            }
            TrackError::RelationOccupied {
                node_id, relation, ..
            } => base.with_node_id(node_id).with_relation(relation),
            TrackError::UnknownRelation { entity, relation } => {
                base.with_relation(format!("{}#{}", entity, relation))
            }
            TrackError::RelationKindMismatch {
                entity, relation, ..
            } => base.with_relation(format!("{}.{}", entity, relation)),
            TrackError::IdentifierMismatch {
                node_id,
                candidates,
                ..
            } => {
                let base = base.with_node_id(node_id);
                if candidates.is_empty() {
                    base
                } else {
                    base.with_candidates(candidates)
                }
            }
            TrackError::UnknownField { .. }
            | TrackError::UnsupportedGraphShape { .. }
            | TrackError::CommitCancelled
            | TrackError::Serialization { .. }
            | TrackError::Internal { .. } => base,
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::Serialization {
            message: err.to_string(),
        }
    }
}
