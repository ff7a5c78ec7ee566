//! JSON serialized AST reader.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use astsentry_core::{NodeId, NodeKind, Position, Tree, TreeError};
use serde::{Deserialize, Serialize};

/// A node as stored in a serialized AST file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// `[line, column]`
    #[serde(default)]
    pub position: (usize, usize),
}

#[derive(Debug, Serialize, Deserialize)]
struct AstFile {
    filename: PathBuf,
    #[serde(default)]
    root: Option<NodeId>,
    #[serde(default)]
    nodes: Vec<AstNode>,
}

/// Errors raised while loading a serialized AST.
#[derive(Debug, thiserror::Error)]
pub enum AstLoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate node {node} in {}", .path.display())]
    DuplicateNode { path: PathBuf, node: NodeId },
}

/// In-memory tree for one source file.
#[derive(Debug, Clone)]
pub struct JsonAst {
    filename: PathBuf,
    root: Option<NodeId>,
    nodes: HashMap<NodeId, AstNode>,
}

impl JsonAst {
    /// Build a tree from already decoded nodes.
    ///
    /// `origin` only labels errors; it is usually the path of the AST file.
    pub fn from_nodes(
        filename: PathBuf,
        root: Option<NodeId>,
        nodes: Vec<AstNode>,
        origin: &Path,
    ) -> Result<Self, AstLoadError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id;
            if index.insert(id, node).is_some() {
                return Err(AstLoadError::DuplicateNode {
                    path: origin.to_path_buf(),
                    node: id,
                });
            }
        }

        Ok(Self {
            filename,
            root,
            nodes: index,
        })
    }

    pub(crate) fn assemble(
        filename: PathBuf,
        root: Option<NodeId>,
        nodes: HashMap<NodeId, AstNode>,
    ) -> Self {
        Self {
            filename,
            root,
            nodes,
        }
    }

    /// Decode a tree from JSON text.
    pub fn from_json_str(content: &str, origin: &Path) -> Result<Self, AstLoadError> {
        let file: AstFile =
            serde_json::from_str(content).map_err(|source| AstLoadError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        Self::from_nodes(file.filename, file.root, file.nodes, origin)
    }

    /// Encode the tree back to JSON, nodes ordered by id.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut nodes: Vec<AstNode> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        serde_json::to_string_pretty(&AstFile {
            filename: self.filename.clone(),
            root: self.root,
            nodes,
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Result<&AstNode, TreeError> {
        self.nodes
            .get(&id)
            .ok_or(TreeError::UnknownNode { node: id })
    }
}

impl Tree for JsonAst {
    fn root(&self) -> Result<NodeId, TreeError> {
        let root = self
            .root
            .ok_or_else(|| TreeError::malformed("tree has no root"))?;
        if !self.nodes.contains_key(&root) {
            return Err(TreeError::malformed(format!(
                "root {} is not a node of the tree",
                root
            )));
        }
        Ok(root)
    }

    fn kind(&self, node: NodeId) -> Result<&NodeKind, TreeError> {
        Ok(&self.node(node)?.kind)
    }

    fn image(&self, node: NodeId) -> Result<Option<&str>, TreeError> {
        Ok(self.node(node)?.image.as_deref())
    }

    fn children(&self, node: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.node(node)?.children)
    }

    fn position(&self, node: NodeId) -> Result<Position, TreeError> {
        let (line, column) = self.node(node)?.position;
        Ok(Position::new(line, column))
    }

    fn filename(&self) -> &Path {
        &self.filename
    }
}

/// Loads serialized ASTs from disk.
#[derive(Debug, Default, Clone)]
pub struct AstReader;

impl AstReader {
    pub fn new() -> Self {
        Self
    }

    /// Read and decode one `.ast.json` file.
    pub fn read_ast(&self, path: &Path) -> Result<JsonAst, AstLoadError> {
        let content = fs::read_to_string(path).map_err(|source| AstLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ast = JsonAst::from_json_str(&content, path)?;
        log::debug!(
            "Loaded AST {} ({} nodes, source {})",
            path.display(),
            ast.node_count(),
            ast.filename().display()
        );
        Ok(ast)
    }
}
