//! Rule registry and enable/disable selection.

use std::collections::HashSet;

use astsentry_core::Rule;

use crate::cve::{FsockopenHostRule, MbSplitRule, SimplexmlLoadFileRule};
use crate::database::DatabaseCallRule;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleSelectionError {
    #[error("unknown rule '{id}' (known rules: {known})")]
    UnknownRule { id: String, known: String },

    #[error("rule '{id}' is registered twice")]
    DuplicateRule { id: String },
}

/// Which registered rules a run should use. Ids match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSelection {
    /// When non-empty, only these rules are kept.
    pub enable: Vec<String>,
    /// Rules removed after `enable` is applied.
    pub disable: Vec<String>,
}

impl RuleSelection {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Ordered collection of rules. Registration order is the order rules run in
/// at each node.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in rule.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                Box::new(FsockopenHostRule),
                Box::new(SimplexmlLoadFileRule),
                Box::new(MbSplitRule),
                Box::new(DatabaseCallRule),
            ],
        }
    }

    /// Append a rule. Ids must be unique.
    pub fn register(&mut self, rule: Box<dyn Rule>) -> Result<&mut Self, RuleSelectionError> {
        if self.get(rule.id()).is_some() {
            return Err(RuleSelectionError::DuplicateRule {
                id: rule.id().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|rule| rule.id() == id)
            .map(|rule| rule.as_ref())
    }

    pub fn rules(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply `selection`, keeping registration order.
    pub fn select(
        self,
        selection: &RuleSelection,
    ) -> Result<Vec<Box<dyn Rule>>, RuleSelectionError> {
        let known: HashSet<&str> = self.rules.iter().map(|rule| rule.id()).collect();
        for id in selection.enable.iter().chain(&selection.disable) {
            if !known.contains(id.as_str()) {
                return Err(RuleSelectionError::UnknownRule {
                    id: id.clone(),
                    known: self.ids().join(", "),
                });
            }
        }

        let selected = self
            .rules
            .into_iter()
            .filter(|rule| {
                selection.enable.is_empty() || selection.enable.iter().any(|id| id == rule.id())
            })
            .filter(|rule| !selection.disable.iter().any(|id| id == rule.id()))
            .collect();
        Ok(selected)
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.ids())
            .finish()
    }
}
