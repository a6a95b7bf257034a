use serde_json::Value;

use crate::definition::{
    ChoiceRuleDefinition, ComparisonOperator, PathField, StateDefinition, StateMachineDefinition,
};
use crate::utils::path::{is_intrinsic_call, is_reference_path, is_valid_path};
use crate::validation::{collect_graphs, error_codes, states_of, ValidationError, Validator};

/// Validates field values that serde alone cannot check:
/// - path syntax of every path field and `.$` template entry
/// - Wait duration fields
/// - choice rule shape
/// - Retry and Catch entries
/// - Map failure tolerance
pub struct FieldValidator;

impl FieldValidator {
    /// Create a new field validator
    pub fn new() -> Self {
        FieldValidator
    }

    fn validate_paths(&self, name: &str, state: &StateDefinition, errors: &mut Vec<ValidationError>) {
        for (field, path) in state.path_fields() {
            if let PathField::Path(path) = path {
                if field == "ResultPath" {
                    self.check_reference_path(name, field, path, errors);
                } else {
                    self.check_path(name, field, path, errors);
                }
            }
        }

        match state {
            StateDefinition::Wait(wait) => {
                self.check_optional_path(name, "SecondsPath", wait.seconds_path.as_deref(), errors);
                self.check_optional_path(name, "TimestampPath", wait.timestamp_path.as_deref(), errors);
            }
            StateDefinition::Fail(fail) => {
                self.check_optional_path(name, "ErrorPath", fail.error_path.as_deref(), errors);
                self.check_optional_path(name, "CausePath", fail.cause_path.as_deref(), errors);
            }
            StateDefinition::Map(map) => {
                self.check_optional_path(name, "ItemsPath", map.items_path.as_deref(), errors);
            }
            _ => {}
        }

        for catcher in state.catchers() {
            if let PathField::Path(path) = &catcher.result_path {
                self.check_reference_path(name, "ResultPath", path, errors);
            }
        }

        for (field, template) in state.templates() {
            self.check_template(name, field, template, errors);
        }
    }

    fn check_optional_path(&self, name: &str, field: &str, path: Option<&str>, errors: &mut Vec<ValidationError>) {
        if let Some(path) = path {
            self.check_path(name, field, path, errors);
        }
    }

    fn check_path(&self, name: &str, field: &str, path: &str, errors: &mut Vec<ValidationError>) {
        if !is_valid_path(path) {
            errors.push(ValidationError::new(
                error_codes::INVALID_PATH,
                format!("States.{} field \"{}\" value \"{}\" is not a valid JSONPath", name, field, path),
                format!("States.{}.{}", name, field),
            ));
        }
    }

    fn check_reference_path(&self, name: &str, field: &str, path: &str, errors: &mut Vec<ValidationError>) {
        if !is_reference_path(path) {
            errors.push(ValidationError::new(
                error_codes::INVALID_PATH,
                format!("States.{} field \"{}\" value \"{}\" is not a valid reference path", name, field, path),
                format!("States.{}.{}", name, field),
            ));
        }
    }

    /// Walk a payload template and check every `.$` entry
    fn check_template(&self, name: &str, field: &str, template: &Value, errors: &mut Vec<ValidationError>) {
        match template {
            Value::Object(map) => {
                for (key, value) in map {
                    if key.ends_with(".$") {
                        let valid = value
                            .as_str()
                            .map(|expr| is_valid_path(expr) || is_intrinsic_call(expr))
                            .unwrap_or(false);
                        if !valid {
                            errors.push(ValidationError::new(
                                error_codes::INVALID_PATH,
                                format!(
                                    "States.{} field \"{}\" key \"{}\" value {} is not a valid JSONPath or intrinsic function",
                                    name, field, key, value
                                ),
                                format!("States.{}.{}", name, field),
                            ));
                        }
                    } else {
                        self.check_template(name, field, value, errors);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.check_template(name, field, item, errors);
                }
            }
            _ => {}
        }
    }

    fn validate_wait(&self, name: &str, state: &StateDefinition, errors: &mut Vec<ValidationError>) {
        let StateDefinition::Wait(wait) = state else { return };

        let given = [
            wait.seconds.is_some(),
            wait.seconds_path.is_some(),
            wait.timestamp.is_some(),
            wait.timestamp_path.is_some(),
        ]
        .iter()
        .filter(|given| **given)
        .count();

        if given != 1 {
            errors.push(ValidationError::new(
                error_codes::INVALID_VALUE,
                format!(
                    "States.{} must have exactly one of \"Seconds\", \"SecondsPath\", \"Timestamp\", \"TimestampPath\"",
                    name
                ),
                format!("States.{}", name),
            ));
        }
    }

    fn validate_choices(&self, name: &str, state: &StateDefinition, errors: &mut Vec<ValidationError>) {
        let StateDefinition::Choice(choice) = state else { return };

        for (i, rule) in choice.choices.iter().flatten().enumerate() {
            let location = format!("States.{}.Choices[{}]", name, i);
            if rule.next.is_none() {
                errors.push(ValidationError::new(
                    error_codes::INVALID_CHOICE_RULE,
                    format!("{} does not have required field \"Next\"", location),
                    location.clone(),
                ));
            }
            self.validate_rule(&location, rule, errors);
        }
    }

    fn validate_rule(&self, location: &str, rule: &ChoiceRuleDefinition, errors: &mut Vec<ValidationError>) {
        if rule.operator_count() != 1 {
            errors.push(ValidationError::new(
                error_codes::INVALID_CHOICE_RULE,
                format!("{} must have exactly one comparison operator", location),
                location,
            ));
            return;
        }

        if let Some(rules) = rule.and.as_ref().or(rule.or.as_ref()) {
            let field = if rule.and.is_some() { "And" } else { "Or" };
            if rules.is_empty() {
                errors.push(ValidationError::new(
                    error_codes::INVALID_CHOICE_RULE,
                    format!("{} field \"{}\" must not be empty", location, field),
                    location,
                ));
            }
            for (i, nested) in rules.iter().enumerate() {
                self.validate_rule(&format!("{}.{}[{}]", location, field, i), nested, errors);
            }
            return;
        }

        if let Some(nested) = rule.not.as_deref() {
            self.validate_rule(&format!("{}.Not", location), nested, errors);
            return;
        }

        let Some((key, operand)) = rule.comparison() else { return };

        match rule.variable.as_deref() {
            None => errors.push(ValidationError::new(
                error_codes::INVALID_CHOICE_RULE,
                format!("{} does not have required field \"Variable\"", location),
                location,
            )),
            Some(variable) if !is_valid_path(variable) => errors.push(ValidationError::new(
                error_codes::INVALID_PATH,
                format!("{} field \"Variable\" value \"{}\" is not a valid JSONPath", location, variable),
                location,
            )),
            Some(_) => {}
        }

        match ComparisonOperator::from_key(key) {
            None => errors.push(ValidationError::new(
                error_codes::INVALID_CHOICE_RULE,
                format!("{} field \"{}\" is not a valid comparison operator", location, key),
                location,
            )),
            Some((_, true)) => {
                if !operand.as_str().is_some_and(is_valid_path) {
                    errors.push(ValidationError::new(
                        error_codes::INVALID_PATH,
                        format!("{} field \"{}\" value {} is not a valid JSONPath", location, key, operand),
                        location,
                    ));
                }
            }
            Some((operator, false)) => {
                if !operator.accepts_literal(operand) {
                    errors.push(ValidationError::new(
                        error_codes::INVALID_CHOICE_RULE,
                        format!("{} field \"{}\" value {} has the wrong type", location, key, operand),
                        location,
                    ));
                }
            }
        }
    }

    fn validate_error_handlers(&self, name: &str, state: &StateDefinition, errors: &mut Vec<ValidationError>) {
        let retriers = state.retriers();
        for (i, retrier) in retriers.iter().enumerate() {
            let location = format!("States.{}.Retry[{}]", name, i);
            self.check_error_equals(&location, &retrier.error_equals, i + 1 == retriers.len(), errors);

            if retrier.backoff_rate.is_some_and(|rate| rate < 1.0) {
                errors.push(ValidationError::new(
                    error_codes::INVALID_ERROR_HANDLER,
                    format!("{} field \"BackoffRate\" must be at least 1.0", location),
                    location.clone(),
                ));
            }
            if retrier.interval_seconds.is_some_and(|interval| interval < 0.0) {
                errors.push(ValidationError::new(
                    error_codes::INVALID_ERROR_HANDLER,
                    format!("{} field \"IntervalSeconds\" must not be negative", location),
                    location.clone(),
                ));
            }
        }

        let catchers = state.catchers();
        for (i, catcher) in catchers.iter().enumerate() {
            let location = format!("States.{}.Catch[{}]", name, i);
            self.check_error_equals(&location, &catcher.error_equals, i + 1 == catchers.len(), errors);

            if catcher.next.is_none() {
                errors.push(ValidationError::new(
                    error_codes::INVALID_ERROR_HANDLER,
                    format!("{} does not have required field \"Next\"", location),
                    location,
                ));
            }
        }
    }

    fn check_error_equals(&self, location: &str, names: &[String], is_last: bool, errors: &mut Vec<ValidationError>) {
        if names.is_empty() {
            errors.push(ValidationError::new(
                error_codes::INVALID_ERROR_HANDLER,
                format!("{} does not have required field \"ErrorEquals\"", location),
                location,
            ));
            return;
        }

        if names.iter().any(|n| n == "States.ALL") && (names.len() > 1 || !is_last) {
            errors.push(ValidationError::new(
                error_codes::INVALID_ERROR_HANDLER,
                format!(
                    "{} field \"ErrorEquals\" value \"States.ALL\" must appear alone in the last entry",
                    location
                ),
                location,
            ));
        }
    }

    fn validate_tolerance(&self, name: &str, state: &StateDefinition, errors: &mut Vec<ValidationError>) {
        let StateDefinition::Map(map) = state else { return };

        if let Some(percentage) = map.tolerated_failure_percentage {
            if !(0.0..=100.0).contains(&percentage) {
                errors.push(ValidationError::new(
                    error_codes::INVALID_VALUE,
                    format!(
                        "States.{} field \"ToleratedFailurePercentage\" value \"{}\" must be between 0 and 100",
                        name, percentage
                    ),
                    format!("States.{}", name),
                ));
            }
        }
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for FieldValidator {
    fn validate(&self, definition: &StateMachineDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for graph in collect_graphs(definition) {
            for (name, state) in states_of(graph.graph) {
                self.validate_paths(name, state, &mut errors);
                self.validate_wait(name, state, &mut errors);
                self.validate_choices(name, state, &mut errors);
                self.validate_error_handlers(name, state, &mut errors);
                self.validate_tolerance(name, state, &mut errors);
            }
        }

        errors
    }
}
