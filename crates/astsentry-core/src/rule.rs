//! Rule abstraction.

use serde::{Deserialize, Serialize};

use crate::finding::Finding;
use crate::tree::{NodeId, Tree, TreeError};

/// What kind of signature a rule detects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCategory {
    /// A known vulnerability fingerprint, usually identified by a CVE id.
    Vulnerability,
    /// Suspicious API usage, e.g. raw database calls.
    Usage(String),
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCategory::Vulnerability => write!(f, "vulnerability"),
            RuleCategory::Usage(category) => write!(f, "usage ({})", category.to_lowercase()),
        }
    }
}

/// A stateless structural predicate evaluated at every node of a tree.
///
/// Rules are constructed once and shared across trees and worker threads, so
/// all traversal-scoped data arrives through the `evaluate` parameters. A rule
/// may look at a bounded number of descendants of `node`, never the whole
/// subtree. Shapes a rule does not expect (missing children, unknown kinds)
/// are a non-match, not an error; only tree access failures are returned as
/// `Err`.
pub trait Rule: Send + Sync {
    /// Stable identifier used in reports and for enable/disable selection.
    fn id(&self) -> &str;

    fn category(&self) -> RuleCategory;

    /// One-line human readable description.
    fn description(&self) -> &str;

    /// Reference URL for the signature, if any.
    fn help_uri(&self) -> Option<&str> {
        None
    }

    /// Evaluate the rule at `node`. Must not return two findings for the same node.
    fn evaluate(&self, node: NodeId, tree: &dyn Tree) -> Result<Vec<Finding>, TreeError>;
}
