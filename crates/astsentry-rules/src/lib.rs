//! Built-in structural rules for astsentry.
//!
//! This crate provides:
//! - CVE fingerprint rules for PHP call sites
//! - A usage rule flagging raw database calls
//! - The rule registry and enable/disable selection

mod cve;
mod database;
pub mod matching;
mod registry;

pub use cve::{FsockopenHostRule, MbSplitRule, SimplexmlLoadFileRule};
pub use database::DatabaseCallRule;
pub use registry::{RuleRegistry, RuleSelection, RuleSelectionError};

// Re-export the rule contract for downstream crates
pub use astsentry_core::{Rule, RuleCategory};
