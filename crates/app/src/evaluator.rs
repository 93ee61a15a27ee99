//! Rule evaluator — which rules fire for a mutation event.
//!
//! Matching is purely a function of the rule snapshot, the event, and
//! the field registry. Evaluation order is the snapshot's order
//! (ascending rule id), so multi-rule firings are reproducible.

use taskflow_domain::entity::EntitySnapshot;
use taskflow_domain::error::EvaluationError;
use taskflow_domain::event::MutationEvent;
use taskflow_domain::field::FieldRegistry;
use taskflow_domain::rule::AutomationRule;

use crate::ports::RuleSet;

/// Enabled rules whose trigger matches the event, in evaluation order.
#[must_use]
pub fn matching_rules<'a>(rules: &'a RuleSet, event: &MutationEvent) -> Vec<&'a AutomationRule> {
    rules
        .enabled()
        .filter(|rule| rule.trigger.matches(event))
        .collect()
}

/// Evaluate all of a rule's conditions (logical AND). Empty is `true`.
///
/// A condition that simply doesn't hold is `Ok(false)`; only typed
/// comparison failures are errors, and the caller isolates those per
/// rule.
///
/// # Errors
///
/// Returns [`EvaluationError`] when a condition references an
/// undeclared field or compares incompatible types.
pub fn conditions_met(
    rule: &AutomationRule,
    snapshot: &EntitySnapshot,
    registry: &FieldRegistry,
) -> Result<bool, EvaluationError> {
    for condition in &rule.conditions {
        if !condition.evaluate(snapshot, registry)? {
            return Ok(false);
        }
    }
    Ok(true)
}
