//! Programmatic tree construction.

use std::collections::HashMap;
use std::path::PathBuf;

use astsentry_core::{NodeId, NodeKind};

use crate::parser::{AstNode, JsonAst};

/// Assembles a `JsonAst` node by node. Ids are allocated sequentially from 0.
///
/// Children are given by id and may refer to nodes added later, or to ids that
/// are never added (useful to exercise `UnknownNode` handling).
#[derive(Debug)]
pub struct AstBuilder {
    filename: PathBuf,
    nodes: HashMap<NodeId, AstNode>,
    next_id: u64,
}

impl AstBuilder {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            nodes: HashMap::new(),
            next_id: 0,
        }
    }

    /// Add a node and return its id.
    pub fn node(
        &mut self,
        kind: &str,
        image: Option<&str>,
        line: usize,
        children: &[NodeId],
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            AstNode {
                id,
                kind: NodeKind::from_tag(kind),
                image: image.map(str::to_string),
                children: children.to_vec(),
                position: (line, 0),
            },
        );
        id
    }

    /// Add a node without children.
    pub fn leaf(&mut self, kind: &str, image: Option<&str>, line: usize) -> NodeId {
        self.node(kind, image, line, &[])
    }

    pub fn build(self, root: NodeId) -> JsonAst {
        JsonAst::assemble(self.filename, Some(root), self.nodes)
    }

    pub fn build_without_root(self) -> JsonAst {
        JsonAst::assemble(self.filename, None, self.nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astsentry_core::{Position, Tree, TreeError};
    use std::path::Path;

    #[test]
    fn test_builder_assigns_sequential_ids() {
        let mut builder = AstBuilder::new("index.php");
        let name = builder.leaf("Id", Some("mb_split"), 3);
        let args = builder.leaf("ArgumentList", None, 3);
        let call = builder.node("FunctionCall", Some("mb_split"), 3, &[name, args]);
        let ast = builder.build(call);

        assert_eq!((name, args, call), (NodeId(0), NodeId(1), NodeId(2)));
        assert_eq!(ast.root().unwrap(), call);
        assert_eq!(ast.children(call).unwrap(), &[name, args]);
        assert_eq!(ast.position(call).unwrap(), Position::new(3, 0));
        assert_eq!(ast.filename(), Path::new("index.php"));
    }

    #[test]
    fn test_builder_without_root() {
        let mut builder = AstBuilder::new("index.php");
        builder.leaf("Start", None, 1);
        let ast = builder.build_without_root();
        assert!(matches!(ast.root(), Err(TreeError::MalformedTree { .. })));
    }
}
