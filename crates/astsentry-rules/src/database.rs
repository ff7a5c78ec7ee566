//! Usage rule flagging raw database calls.

use astsentry_core::{Finding, NodeId, NodeKind, Rule, RuleCategory, Tree, TreeError};

use crate::matching::{child_at, image_or_empty};

const CATEGORY: &str = "Database";

/// Functions that send a query string straight to the server.
const RAW_QUERY_FUNCTIONS: &[&str] = &["mysql_query", "mysqli_query"];

/// Reports direct database calls.
///
/// Three shapes are recognized:
/// - `mysql_query(...)` / `mysqli_query(...)`
/// - `$stmt->execute(...)`
/// - `$this->mysql->exec(...)`
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseCallRule;

impl DatabaseCallRule {
    pub const ID: &'static str = "DB-CALL";

    /// Rendered callee for a `->` chain rooted at `node`, if it is a database call.
    fn member_call(&self, node: NodeId, tree: &dyn Tree) -> Result<Option<String>, TreeError> {
        let (Some(target), Some(method)) = (child_at(tree, node, 0)?, child_at(tree, node, 1)?)
        else {
            return Ok(None);
        };
        if tree.kind(method)? != &NodeKind::MethodCall {
            return Ok(None);
        }
        let method_image = image_or_empty(tree, method)?;

        match (tree.kind(target)?, method_image) {
            (NodeKind::Variable, "execute") => Ok(Some(format!(
                "{}->{}",
                image_or_empty(tree, target)?,
                method_image
            ))),
            (NodeKind::BinOp, "exec") => {
                let (Some(owner), Some(handle)) =
                    (child_at(tree, target, 0)?, child_at(tree, target, 1)?)
                else {
                    return Ok(None);
                };
                if tree.image(handle)? != Some("mysql") {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "{}->{}->{}",
                    image_or_empty(tree, owner)?,
                    image_or_empty(tree, handle)?,
                    method_image
                )))
            }
            _ => Ok(None),
        }
    }
}

impl Rule for DatabaseCallRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Usage(CATEGORY.to_string())
    }

    fn description(&self) -> &str {
        "Direct database call (raw query function or PDO/mysql handle)"
    }

    fn evaluate(&self, node: NodeId, tree: &dyn Tree) -> Result<Vec<Finding>, TreeError> {
        let callee = match tree.kind(node)? {
            NodeKind::FunctionCall => tree
                .image(node)?
                .filter(|image| RAW_QUERY_FUNCTIONS.contains(image))
                .map(str::to_string),
            NodeKind::BinOp if tree.image(node)? == Some("->") => self.member_call(node, tree)?,
            _ => None,
        };

        match callee {
            Some(callee) => Ok(vec![Finding::usage(Self::ID, CATEGORY, callee, tree, node)?]),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astsentry_core::FindingKind;
    use astsentry_parser::AstBuilder;

    #[test]
    fn test_raw_query_functions() {
        let mut builder = AstBuilder::new("a.php");
        let name = builder.leaf("Id", Some("mysqli_query"), 3);
        let call = builder.node("FunctionCall", Some("mysqli_query"), 3, &[name]);
        let other = builder.leaf("FunctionCall", Some("mysql_connect"), 4);
        let root = builder.node("Start", None, 1, &[call, other]);
        let ast = builder.build(root);

        let findings = DatabaseCallRule.evaluate(call, &ast).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message(), "Database call 'mysqli_query'");
        assert_eq!(findings[0].line(), 3);

        assert!(DatabaseCallRule.evaluate(other, &ast).unwrap().is_empty());
        assert!(DatabaseCallRule.evaluate(root, &ast).unwrap().is_empty());
    }

    #[test]
    fn test_variable_execute() {
        let mut builder = AstBuilder::new("a.php");
        let stmt = builder.leaf("Variable", Some("$stmt"), 8);
        let execute = builder.leaf("MethodCall", Some("execute"), 8);
        let arrow = builder.node("BinOP", Some("->"), 8, &[stmt, execute]);
        let ast = builder.build(arrow);

        let findings = DatabaseCallRule.evaluate(arrow, &ast).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].kind(),
            &FindingKind::Usage {
                category: "Database".to_string(),
                callee: "$stmt->execute".to_string()
            }
        );
        assert_eq!(findings[0].message(), "Database call '$stmt->execute'");
    }

    #[test]
    fn test_chained_mysql_exec() {
        let mut builder = AstBuilder::new("a.php");
        let this = builder.leaf("Variable", Some("$this"), 20);
        let mysql = builder.leaf("Property", Some("mysql"), 20);
        let inner = builder.node("BinOP", Some("->"), 20, &[this, mysql]);
        let exec = builder.leaf("MethodCall", Some("exec"), 20);
        let outer = builder.node("BinOP", Some("->"), 20, &[inner, exec]);
        let ast = builder.build(outer);

        let findings = DatabaseCallRule.evaluate(outer, &ast).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message(), "Database call '$this->mysql->exec'");
        assert!(DatabaseCallRule.evaluate(inner, &ast).unwrap().is_empty());
    }

    #[test]
    fn test_non_matching_member_calls() {
        let mut builder = AstBuilder::new("a.php");
        let stmt = builder.leaf("Variable", Some("$stmt"), 8);
        let fetch = builder.leaf("MethodCall", Some("fetch"), 8);
        let fetch_call = builder.node("BinOP", Some("->"), 8, &[stmt, fetch]);
        let execute = builder.leaf("MethodCall", Some("execute"), 9);
        let static_call = builder.node("BinOP", Some("::"), 9, &[stmt, execute]);
        let lonely = builder.node("BinOP", Some("->"), 10, &[stmt]);
        let other = builder.leaf("Property", Some("pdo"), 11);
        let inner = builder.node("BinOP", Some("->"), 11, &[stmt, other]);
        let exec = builder.leaf("MethodCall", Some("exec"), 11);
        let pdo_exec = builder.node("BinOP", Some("->"), 11, &[inner, exec]);
        let root = builder.node(
            "Start",
            None,
            1,
            &[fetch_call, static_call, lonely, pdo_exec],
        );
        let ast = builder.build(root);

        for node in [fetch_call, static_call, lonely, pdo_exec] {
            assert!(DatabaseCallRule.evaluate(node, &ast).unwrap().is_empty());
        }
    }
}
