//! Report generation for the astsentry scanner.
//!
//! This crate provides the `Reporter` contract and its sinks:
//! - Plain text, one line per finding
//! - JSON lines
//! - SARIF (Static Analysis Results Interchange Format)
//! - `SharedReporter` and `FanOut` combinators

pub mod filename;
pub mod jsonl;
pub mod reporter;
pub mod sarif;
pub mod text;

pub use filename::artifact_uri;
pub use jsonl::JsonLinesReporter;
pub use reporter::{FanOut, ReportError, Reporter, SharedReporter};
pub use sarif::{SarifReport, SarifReporter};
pub use text::{TextReporter, render_finding};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use astsentry_core::Finding;
    use astsentry_parser::AstBuilder;

    const ROOT: &str = "/srv/wordpress";
    const FILE: &str = "wp-includes/http.php";

    /// A vulnerability finding for `rule_id` at `line`, already resolved.
    pub fn finding(rule_id: &str, line: usize) -> Finding {
        let mut builder = AstBuilder::new(FILE);
        let node = builder.leaf("FunctionCall", None, line);
        let ast = builder.build(node);
        Finding::vulnerability(rule_id, &ast, node)
            .unwrap()
            .resolved_against(Path::new(ROOT))
    }

    /// A database usage finding for `callee` at `line`, already resolved.
    pub fn usage(callee: &str, line: usize) -> Finding {
        let mut builder = AstBuilder::new(FILE);
        let node = builder.leaf("FunctionCall", Some(callee), line);
        let ast = builder.build(node);
        Finding::usage("DB-CALL", "Database", callee, &ast, node)
            .unwrap()
            .resolved_against(Path::new(ROOT))
    }
}
