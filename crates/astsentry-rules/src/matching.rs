//! Small structural predicates shared by rules.
//!
//! Every helper treats a missing child as "no match" and only returns `Err`
//! when the tree itself cannot answer a query.

use astsentry_core::{NodeId, NodeKind, Tree, TreeError};

/// Child of `node` at `index`, or `None` when the node has fewer children.
pub fn child_at(tree: &dyn Tree, node: NodeId, index: usize) -> Result<Option<NodeId>, TreeError> {
    Ok(tree.children(node)?.get(index).copied())
}

/// `node` has exactly this kind and this image.
pub fn has_kind_and_image(
    tree: &dyn Tree,
    node: NodeId,
    kind: &NodeKind,
    image: &str,
) -> Result<bool, TreeError> {
    Ok(tree.kind(node)? == kind && tree.image(node)? == Some(image))
}

/// `node` is a `FunctionCall` to `name`.
pub fn is_call_to(tree: &dyn Tree, node: NodeId, name: &str) -> Result<bool, TreeError> {
    has_kind_and_image(tree, node, &NodeKind::FunctionCall, name)
}

/// Image of `node`, or the empty string when it has none.
pub fn image_or_empty(tree: &dyn Tree, node: NodeId) -> Result<&str, TreeError> {
    Ok(tree.image(node)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use astsentry_parser::AstBuilder;

    #[test]
    fn test_child_at_out_of_range_is_none() {
        let mut builder = AstBuilder::new("a.php");
        let arg = builder.leaf("Variable", Some("$x"), 1);
        let call = builder.node("FunctionCall", Some("f"), 1, &[arg]);
        let ast = builder.build(call);

        assert_eq!(child_at(&ast, call, 0).unwrap(), Some(arg));
        assert_eq!(child_at(&ast, call, 1).unwrap(), None);
        assert_eq!(child_at(&ast, arg, 0).unwrap(), None);
    }

    #[test]
    fn test_is_call_to_is_case_sensitive() {
        let mut builder = AstBuilder::new("a.php");
        let call = builder.leaf("FunctionCall", Some("MB_SPLIT"), 1);
        let ast = builder.build(call);

        assert!(is_call_to(&ast, call, "MB_SPLIT").unwrap());
        assert!(!is_call_to(&ast, call, "mb_split").unwrap());
    }

    #[test]
    fn test_image_or_empty() {
        let mut builder = AstBuilder::new("a.php");
        let start = builder.leaf("Start", None, 1);
        let ast = builder.build(start);
        assert_eq!(image_or_empty(&ast, start).unwrap(), "");
    }
}
