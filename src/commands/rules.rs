//! Rules command handlers: list, add, remove and reorder sorting rules.

use anyhow::{Context, Result, anyhow, bail};
use mediadl_core::AppConfig;
use mediadl_core::sorting::{
    Condition, MoveDirection, Operator, RuleDraft, RuleScope, RuleStore, SortingRule,
};

use crate::ProcessExit;
use crate::cli::{MoveArg, RuleAddArgs};

fn store(config: &AppConfig) -> RuleStore {
    RuleStore::new(config.rules_path())
}

/// One line per rule, in evaluation order.
pub(crate) fn describe_rule(position: usize, rule: &SortingRule) -> String {
    let conditions = rule
        .effective_conditions()
        .iter()
        .map(|c| format!("{} {} [{}]", c.field, c.operator, c.values.join(", ")))
        .collect::<Vec<_>>()
        .join(" AND ");
    let subfolder = rule
        .effective_subfolder()
        .map(|s| format!("/{s}"))
        .unwrap_or_default();
    format!(
        "{position}. {} ({}) [{}] -> {}{subfolder} when {}",
        rule.name,
        rule.id,
        rule.effective_scope(),
        rule.target_path.display(),
        if conditions.is_empty() {
            "never"
        } else {
            conditions.as_str()
        }
    )
}

pub(crate) fn run_rules_list(config: &AppConfig) -> Result<ProcessExit> {
    let store = store(config);
    let rules = store
        .load()
        .with_context(|| format!("failed to read rules from {}", store.path().display()))?;
    if rules.is_empty() {
        println!("No sorting rules in {}", store.path().display());
    }
    for (index, rule) in rules.iter().enumerate() {
        println!("{}", describe_rule(index + 1, rule));
    }
    Ok(ProcessExit::Success)
}

/// Parses `FIELD:OPERATOR:VALUE[,VALUE...]`.
pub(crate) fn parse_condition(raw: &str) -> Result<Condition> {
    let mut parts = raw.splitn(3, ':');
    let (Some(field), Some(operator), Some(values)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!(
            "invalid condition '{raw}'\n  Suggestion: Use FIELD:OPERATOR:VALUE, e.g. uploader:is_one_of:Alice,Bob"
        );
    };
    let field = field.trim();
    if field.is_empty() {
        bail!("invalid condition '{raw}': field is empty");
    }
    let operator: Operator = operator.parse().map_err(|e: String| anyhow!(e))?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() {
        bail!("invalid condition '{raw}': at least one value is required");
    }
    Ok(Condition::new(field, operator, values))
}

pub(crate) fn run_rules_add(config: &AppConfig, args: &RuleAddArgs) -> Result<ProcessExit> {
    let download_type: RuleScope = args.scope.parse().map_err(|e: String| anyhow!(e))?;
    let conditions = args
        .conditions
        .iter()
        .map(|raw| parse_condition(raw))
        .collect::<Result<Vec<_>>>()?;
    if conditions.is_empty() {
        bail!("a rule needs at least one --when condition\n  Suggestion: e.g. --when uploader:is_one_of:Alice");
    }
    let rule = store(config).add(RuleDraft {
        name: args.name.clone(),
        target_path: args.target.clone(),
        subfolder_pattern: args.subfolder.clone(),
        download_type,
        conditions,
    })?;
    println!("Added rule {} ({})", rule.name, rule.id);
    Ok(ProcessExit::Success)
}

pub(crate) fn run_rules_remove(config: &AppConfig, id: &str) -> Result<ProcessExit> {
    if store(config).delete(id)? {
        println!("Removed rule {id}");
        Ok(ProcessExit::Success)
    } else {
        println!("No rule with id {id}");
        Ok(ProcessExit::Failure)
    }
}

pub(crate) fn run_rules_move(config: &AppConfig, id: &str, direction: MoveArg) -> Result<ProcessExit> {
    let direction = match direction {
        MoveArg::Up => MoveDirection::Up,
        MoveArg::Down => MoveDirection::Down,
    };
    if store(config).move_rule(id, direction)? {
        println!("Moved rule {id}");
        Ok(ProcessExit::Success)
    } else {
        println!("Rule {id} not found or already at the edge");
        Ok(ProcessExit::Failure)
    }
}
