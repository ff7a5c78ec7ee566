//! Traversal engine and batch runner for astsentry.
//!
//! This crate provides:
//! - `engine::run`, the single pre-order walk that drives every rule at every node
//! - `BatchRunner`, which applies the engine across many serialized trees

pub mod batch;
pub mod engine;

pub use batch::{
    AstJob, BatchError, BatchRunner, BatchSummary, CancellationFlag, FailureStage, TreeFailure,
    TreeSource,
};
pub use engine::{TraversalError, run};
