//! Core types and traits for the astsentry scanner.
//!
//! This crate provides the contracts shared by every astsentry component:
//! - The read-only tree access contract (`Tree`, `NodeId`, `NodeKind`, `Position`)
//! - The rule abstraction (`Rule`, `RuleCategory`)
//! - Findings produced by rules (`Finding`, `FindingKind`)

mod finding;
mod kind;
mod rule;
mod tree;

pub use finding::{Finding, FindingKind};
pub use kind::NodeKind;
pub use rule::{Rule, RuleCategory};
pub use tree::{NodeId, Position, Tree, TreeError};
