//! Findings produced by rules.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::tree::{NodeId, Tree, TreeError};

/// Distinguishes vulnerability signatures from usage patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FindingKind {
    Vulnerability,
    Usage { category: String, callee: String },
}

/// One match of one rule at one node.
///
/// Findings are immutable once created. Resolving the file path against a
/// source root yields a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    rule_id: String,
    kind: FindingKind,
    file: PathBuf,
    line: usize,
    column: usize,
    message: String,
}

impl Finding {
    /// Create a vulnerability finding located at `node`.
    pub fn vulnerability(rule_id: &str, tree: &dyn Tree, node: NodeId) -> Result<Self, TreeError> {
        let position = tree.position(node)?;
        Ok(Self {
            rule_id: rule_id.to_string(),
            kind: FindingKind::Vulnerability,
            file: tree.filename().to_path_buf(),
            line: position.line,
            column: position.column,
            message: format!("Potential {} detected", rule_id),
        })
    }

    /// Create a usage finding for a call rendered as `callee`, located at `node`.
    pub fn usage(
        rule_id: &str,
        category: &str,
        callee: impl Into<String>,
        tree: &dyn Tree,
        node: NodeId,
    ) -> Result<Self, TreeError> {
        let position = tree.position(node)?;
        let callee = callee.into();
        Ok(Self {
            rule_id: rule_id.to_string(),
            message: format!("{} call '{}'", category, callee),
            kind: FindingKind::Usage {
                category: category.to_string(),
                callee,
            },
            file: tree.filename().to_path_buf(),
            line: position.line,
            column: position.column,
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn kind(&self) -> &FindingKind {
        &self.kind
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Resolve the file path against `root`.
    ///
    /// The result is always absolute. It is canonicalized when the file exists
    /// on disk, otherwise it is made absolute against the working directory and
    /// normalized lexically (`.` and `..` components folded).
    #[must_use]
    pub fn resolved_against(&self, root: &Path) -> Finding {
        let joined = root.join(&self.file);
        let file = std::fs::canonicalize(&joined).unwrap_or_else(|_| {
            let absolute = std::path::absolute(&joined).unwrap_or(joined);
            normalize(&absolute)
        });
        Finding {
            file,
            ..self.clone()
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
