//! Engine error types

use crate::tree::NodeId;
use thiserror::Error;

/// Errors that can occur in engine operations
///
/// Resolution-service failures are not represented here: the resolver
/// degrades them to "unresolved" and logs them instead of propagating.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {id} is not a {expected}")]
    WrongKind { id: NodeId, expected: &'static str },

    #[error("Duplicate element id in tree: {0}")]
    DuplicateId(String),

    #[error("Not a section: {0}")]
    NotASection(NodeId),

    #[error("No {kind} registered for identifier {id}")]
    NotRegistered { kind: &'static str, id: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
