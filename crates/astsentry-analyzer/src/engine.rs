//! Depth-first traversal driving every rule at every node.

use std::collections::HashSet;
use std::path::PathBuf;

use astsentry_core::{Finding, NodeId, Position, Rule, Tree, TreeError};

/// A tree access failure during one walk, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{}: {source}", .filename.display(), near(.last_position))]
pub struct TraversalError {
    /// Source filename recorded in the tree.
    pub filename: PathBuf,
    /// Position of the last node reached. When a rule fails, this is the node
    /// it was evaluated at.
    pub last_position: Option<Position>,
    #[source]
    pub source: TreeError,
}

fn near(position: &Option<Position>) -> String {
    position
        .map(|position| format!(" (near {})", position))
        .unwrap_or_default()
}

/// Walk `tree` in pre-order and evaluate every rule at every node.
///
/// Findings come out in visitation order (children left to right), and for a
/// single node in the order of `rules`.
pub fn run(tree: &dyn Tree, rules: &[Box<dyn Rule>]) -> Result<Vec<Finding>, TraversalError> {
    let mut walk = Walk::default();
    match walk.visit_all(tree, rules) {
        Ok(findings) => {
            log::debug!(
                "Walked {}: {} nodes, {} findings",
                tree.filename().display(),
                walk.visited.len(),
                findings.len()
            );
            Ok(findings)
        }
        Err(source) => Err(TraversalError {
            filename: tree.filename().to_path_buf(),
            last_position: walk.last_position,
            source,
        }),
    }
}

#[derive(Default)]
struct Walk {
    visited: HashSet<NodeId>,
    last_position: Option<Position>,
}

impl Walk {
    fn visit_all(
        &mut self,
        tree: &dyn Tree,
        rules: &[Box<dyn Rule>],
    ) -> Result<Vec<Finding>, TreeError> {
        let mut findings = Vec::new();
        let mut stack = vec![tree.root()?];

        while let Some(node) = stack.pop() {
            if !self.visited.insert(node) {
                return Err(TreeError::malformed(format!(
                    "node {} is reachable more than once",
                    node
                )));
            }
            self.last_position = Some(tree.position(node)?);

            for rule in rules {
                findings.extend(rule.evaluate(node, tree)?);
            }

            // Reversed so the leftmost child is popped first.
            stack.extend(tree.children(node)?.iter().rev().copied());
        }

        Ok(findings)
    }
}
