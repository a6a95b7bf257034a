use crate::definition::{ChoiceRuleDefinition, StateDefinition, StateMachineDefinition};
use crate::validation::{collect_graphs, error_codes, states_of, ValidationError, Validator};

/// Validates transition targets:
/// - `StartAt` names a state of its graph
/// - `Next`, `Default`, choice-rule and catcher targets name a state of the
///   same graph. Nested graphs are separate namespaces in both directions.
pub struct ReferenceValidator;

impl ReferenceValidator {
    /// Create a new reference validator
    pub fn new() -> Self {
        ReferenceValidator
    }

    fn not_found(&self, owner: &str, field: &str, target: &str) -> ValidationError {
        ValidationError::new(
            error_codes::INVALID_REFERENCE,
            format!(
                "{} field \"{}\" value \"{}\" is not found in \"States\"",
                owner, field, target
            ),
            owner,
        )
    }

    fn validate_start_at(&self, label: &str, graph: &StateMachineDefinition) -> Option<ValidationError> {
        // A missing StartAt or States is reported by the structure validator
        let start_at = graph.start_at.as_deref()?;
        graph.states.as_ref()?;
        if graph.contains_state(start_at) {
            None
        } else {
            Some(self.not_found(label, "StartAt", start_at))
        }
    }

    /// All (field, target) pairs a state may transition to
    fn targets<'a>(&self, state: &'a StateDefinition) -> Vec<(&'static str, &'a str)> {
        let mut targets = Vec::new();

        if let Some(next) = state.next() {
            targets.push(("Next", next));
        }

        if let StateDefinition::Choice(choice) = state {
            for rule in choice.choices.iter().flatten() {
                self.rule_targets(rule, &mut targets);
            }
            if let Some(default) = choice.default.as_deref() {
                targets.push(("Default", default));
            }
        }

        for catcher in state.catchers() {
            if let Some(next) = catcher.next.as_deref() {
                targets.push(("Next", next));
            }
        }

        targets
    }

    fn rule_targets<'a>(&self, rule: &'a ChoiceRuleDefinition, targets: &mut Vec<(&'static str, &'a str)>) {
        if let Some(next) = rule.next.as_deref() {
            targets.push(("Next", next));
        }
    }
}

impl Default for ReferenceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for ReferenceValidator {
    fn validate(&self, definition: &StateMachineDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for graph in collect_graphs(definition) {
            errors.extend(self.validate_start_at(&graph.label, graph.graph));

            for (name, state) in states_of(graph.graph) {
                let owner = format!("States.{}", name);
                for (field, target) in self.targets(state) {
                    if !graph.graph.contains_state(target) {
                        errors.push(self.not_found(&owner, field, target));
                    }
                }
            }
        }

        errors
    }
}
