//! Node kind definitions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category tag of a tree node.
///
/// The kinds the built-in rules care about are listed explicitly. Any other
/// tag produced by the parser is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    FunctionCall,
    MethodCall,
    ArgumentList,
    StringExpression,
    Variable,
    BinOp,
    Other(String),
}

impl NodeKind {
    /// Create a NodeKind from a parser tag. Matching is exact and case-sensitive.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "FunctionCall" => NodeKind::FunctionCall,
            "MethodCall" => NodeKind::MethodCall,
            "ArgumentList" => NodeKind::ArgumentList,
            "StringExpression" => NodeKind::StringExpression,
            "Variable" => NodeKind::Variable,
            "BinOP" | "BinOp" => NodeKind::BinOp,
            other => NodeKind::Other(other.to_string()),
        }
    }

    /// Get the tag for this kind as emitted by the parser.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::FunctionCall => "FunctionCall",
            NodeKind::MethodCall => "MethodCall",
            NodeKind::ArgumentList => "ArgumentList",
            NodeKind::StringExpression => "StringExpression",
            NodeKind::Variable => "Variable",
            NodeKind::BinOp => "BinOP",
            NodeKind::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match Self::from_tag(&tag) {
            NodeKind::Other(_) => NodeKind::Other(tag),
            known => known,
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}
