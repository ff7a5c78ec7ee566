//! Utility functions for the astsentry scanner.

pub mod file_discovery;

pub use file_discovery::{AST_SUFFIX, AstDiscovery, FILELIST_NAME, read_filelist};
