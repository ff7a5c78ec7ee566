use anyhow::Result;
use std::process::ExitCode;

use astsentry_core::Rule;
use astsentry_rules::RuleRegistry;

pub fn run_rules_command() -> Result<ExitCode> {
    let registry = RuleRegistry::builtin();
    print!("{}", render_rule_table(registry.rules()));
    Ok(ExitCode::SUCCESS)
}

/// One line per rule, in evaluation order.
fn render_rule_table(rules: &[Box<dyn Rule>]) -> String {
    let width = rules.iter().map(|rule| rule.id().len()).max().unwrap_or(0);
    rules
        .iter()
        .map(|rule| {
            format!(
                "{:width$}  {:18}  {}\n",
                rule.id(),
                rule.category().to_string(),
                rule.description(),
                width = width
            )
        })
        .collect()
}
