//! CVE fingerprint rules for PHP call sites.

use std::sync::LazyLock;

use astsentry_core::{Finding, NodeId, NodeKind, Rule, RuleCategory, Tree, TreeError};
use regex::Regex;

use crate::matching::{child_at, image_or_empty, is_call_to};

/// Host argument that is interpolated (`$host`) or carries its own `:port`.
static SUSPICIOUS_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$|:\d+$").expect("host pattern is a valid regex"));

/// CVE-2017-7189: `fsockopen()` misparses a host that already contains a port.
///
/// Matches a `fsockopen` call whose second child is its `ArgumentList` and
/// whose first argument is anything but a plain string literal, or a literal
/// that is interpolated or ends in `:<port>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsockopenHostRule;

impl FsockopenHostRule {
    pub const ID: &'static str = "CVE-2017-7189";
}

impl Rule for FsockopenHostRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Vulnerability
    }

    fn description(&self) -> &str {
        "fsockopen() host argument may carry its own port and be misparsed"
    }

    fn help_uri(&self) -> Option<&str> {
        Some("https://nvd.nist.gov/vuln/detail/CVE-2017-7189")
    }

    fn evaluate(&self, node: NodeId, tree: &dyn Tree) -> Result<Vec<Finding>, TreeError> {
        if !is_call_to(tree, node, "fsockopen")? {
            return Ok(Vec::new());
        }

        let Some(arguments) = child_at(tree, node, 1)? else {
            return Ok(Vec::new());
        };
        if tree.kind(arguments)? != &NodeKind::ArgumentList {
            return Ok(Vec::new());
        }
        let Some(&host) = tree.children(arguments)?.first() else {
            return Ok(Vec::new());
        };

        let suspicious = tree.kind(host)? != &NodeKind::StringExpression
            || SUSPICIOUS_HOST.is_match(image_or_empty(tree, host)?);

        if suspicious {
            Ok(vec![Finding::vulnerability(Self::ID, tree, node)?])
        } else {
            Ok(Vec::new())
        }
    }
}

/// CVE-2021-21707: `simplexml_load_file()` truncates paths at special characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplexmlLoadFileRule;

impl SimplexmlLoadFileRule {
    pub const ID: &'static str = "CVE-2021-21707";
}

impl Rule for SimplexmlLoadFileRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Vulnerability
    }

    fn description(&self) -> &str {
        "simplexml_load_file() path may be cut at special characters"
    }

    fn help_uri(&self) -> Option<&str> {
        Some("https://nvd.nist.gov/vuln/detail/CVE-2021-21707")
    }

    fn evaluate(&self, node: NodeId, tree: &dyn Tree) -> Result<Vec<Finding>, TreeError> {
        if tree.children(node)?.len() >= 2 && is_call_to(tree, node, "simplexml_load_file")? {
            Ok(vec![Finding::vulnerability(Self::ID, tree, node)?])
        } else {
            Ok(Vec::new())
        }
    }
}

/// CVE-2019-9025: `mb_split()` reads out of bounds on illegal multibyte input.
///
/// Whether the subject string is actually illegal is not checked, so every
/// `mb_split` call with arguments is reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct MbSplitRule;

impl MbSplitRule {
    pub const ID: &'static str = "CVE-2019-9025";
}

impl Rule for MbSplitRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Vulnerability
    }

    fn description(&self) -> &str {
        "mb_split() on untrusted multibyte input may read out of bounds"
    }

    fn help_uri(&self) -> Option<&str> {
        Some("https://nvd.nist.gov/vuln/detail/CVE-2019-9025")
    }

    fn evaluate(&self, node: NodeId, tree: &dyn Tree) -> Result<Vec<Finding>, TreeError> {
        if tree.children(node)?.len() >= 2 && is_call_to(tree, node, "mb_split")? {
            Ok(vec![Finding::vulnerability(Self::ID, tree, node)?])
        } else {
            Ok(Vec::new())
        }
    }
}
