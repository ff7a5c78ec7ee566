//! Serialized AST reader.
//!
//! This crate provides:
//! - `JsonAst`, an in-memory tree implementing the `Tree` contract
//! - `AstReader`, which loads `JsonAst` values from `.ast.json` files
//! - `AstBuilder`, for assembling trees programmatically

mod builder;
mod parser;

pub use builder::AstBuilder;
pub use parser::{AstLoadError, AstNode, AstReader, JsonAst};

// Re-export core tree types for downstream crates
pub use astsentry_core::{NodeId, NodeKind, Position, Tree, TreeError};
