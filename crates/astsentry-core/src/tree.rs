//! Read-only tree access contract.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kind::NodeKind;

/// Opaque node identifier, unique within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Source position of a node. Lines are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Failures of the tree access contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("unknown node {node}")]
    UnknownNode { node: NodeId },

    #[error("malformed tree: {reason}")]
    MalformedTree { reason: String },
}

impl TreeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        TreeError::MalformedTree {
            reason: reason.into(),
        }
    }
}

/// Read-only handle over one parsed source file.
///
/// Every accessor must be O(1) or O(children). Accessors taking a `NodeId`
/// fail with `TreeError::UnknownNode` for ids that do not belong to the tree.
pub trait Tree: Send + Sync {
    /// Traversal entry point. Fails with `MalformedTree` when the tree has no root.
    fn root(&self) -> Result<NodeId, TreeError>;

    fn kind(&self, node: NodeId) -> Result<&NodeKind, TreeError>;

    /// Literal text of the node (call name, operator, literal value), if any.
    fn image(&self, node: NodeId) -> Result<Option<&str>, TreeError>;

    /// Child ids in parser order.
    fn children(&self, node: NodeId) -> Result<&[NodeId], TreeError>;

    fn position(&self, node: NodeId) -> Result<Position, TreeError>;

    /// Source filename the tree was parsed from, as recorded by the parser.
    fn filename(&self) -> &Path;
}
