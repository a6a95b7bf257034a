use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use stepwise_dsl::{ChoiceRuleDefinition, ChoiceStateDefinition, ComparisonOperator, PathField};

use super::{Advance, DataFlow};
use crate::context::Context;
use crate::error::ExecutionError;
use crate::path::Path;

/// Right-hand side of a comparison
#[derive(Debug, Clone)]
pub enum Operand {
    Literal(Value),
    Path(Path),
}

/// A compiled choice rule
#[derive(Debug, Clone)]
pub enum ChoiceRule {
    And(Vec<ChoiceRule>),
    Or(Vec<ChoiceRule>),
    Not(Box<ChoiceRule>),
    Compare {
        variable: Path,
        operator: ComparisonOperator,
        operand: Operand,
        // Only for StringMatches
        pattern: Option<Regex>,
    },
}

impl ChoiceRule {
    pub fn compile(definition: &ChoiceRuleDefinition) -> Result<Self, String> {
        if let Some(rules) = &definition.and {
            return Self::compile_all(rules).map(ChoiceRule::And);
        }
        if let Some(rules) = &definition.or {
            return Self::compile_all(rules).map(ChoiceRule::Or);
        }
        if let Some(rule) = &definition.not {
            return Self::compile(rule).map(|rule| ChoiceRule::Not(Box::new(rule)));
        }

        let variable = definition
            .variable
            .as_deref()
            .ok_or_else(|| "choice rule does not have required field \"Variable\"".to_string())?;
        let variable = Path::parse(variable).map_err(|err| err.message)?;

        let (key, value) = definition
            .comparison()
            .ok_or_else(|| "choice rule must have exactly one comparison operator".to_string())?;
        let (operator, is_path) = ComparisonOperator::from_key(key)
            .ok_or_else(|| format!("field \"{}\" is not a valid comparison operator", key))?;

        let operand = if is_path {
            let path = value
                .as_str()
                .ok_or_else(|| format!("field \"{}\" must be a path", key))?;
            Operand::Path(Path::parse(path).map_err(|err| err.message)?)
        } else {
            if !operator.accepts_literal(value) {
                return Err(format!("field \"{}\" value {} has the wrong type", key, value));
            }
            Operand::Literal(value.clone())
        };

        let pattern = match (&operator, &operand) {
            (ComparisonOperator::StringMatches, Operand::Literal(Value::String(glob))) => {
                Some(wildcard_regex(glob)?)
            }
            _ => None,
        };

        Ok(ChoiceRule::Compare {
            variable,
            operator,
            operand,
            pattern,
        })
    }

    fn compile_all(rules: &[ChoiceRuleDefinition]) -> Result<Vec<Self>, String> {
        rules.iter().map(Self::compile).collect()
    }

    /// Evaluate against the state's effective input
    pub fn matches(&self, input: &Value, context: &Value) -> bool {
        match self {
            ChoiceRule::And(rules) => rules.iter().all(|rule| rule.matches(input, context)),
            ChoiceRule::Or(rules) => rules.iter().any(|rule| rule.matches(input, context)),
            ChoiceRule::Not(rule) => !rule.matches(input, context),
            ChoiceRule::Compare {
                variable,
                operator,
                operand,
                pattern,
            } => {
                let value = variable.evaluate(input, context).ok();
                let expected = match operand {
                    Operand::Literal(value) => Some(value.clone()),
                    Operand::Path(path) => path.evaluate(input, context).ok(),
                };
                compare(*operator, value.as_ref(), expected.as_ref(), pattern.as_ref())
            }
        }
    }
}

fn compare(
    operator: ComparisonOperator,
    value: Option<&Value>,
    expected: Option<&Value>,
    pattern: Option<&Regex>,
) -> bool {
    use ComparisonOperator::*;

    if operator == IsPresent && value.is_none() {
        return expected.and_then(Value::as_bool) == Some(false);
    }
    let (Some(value), Some(expected)) = (value, expected) else {
        return false;
    };

    match operator {
        IsNull => expected.as_bool() == Some(value.is_null()),
        IsNumeric => expected.as_bool() == Some(value.is_number()),
        IsString => expected.as_bool() == Some(value.is_string()),
        IsBoolean => expected.as_bool() == Some(value.is_boolean()),
        IsTimestamp => expected.as_bool() == Some(value.as_str().and_then(parse_timestamp).is_some()),
        BooleanEquals => value.as_bool().is_some() && value.as_bool() == expected.as_bool(),
        StringMatches => match (value.as_str(), pattern) {
            (Some(text), Some(pattern)) => pattern.is_match(text),
            _ => false,
        },
        StringEquals => ordering(value.as_str(), expected.as_str()) == Some(Ordering::Equal),
        StringLessThan => ordering(value.as_str(), expected.as_str()) == Some(Ordering::Less),
        StringGreaterThan => ordering(value.as_str(), expected.as_str()) == Some(Ordering::Greater),
        StringLessThanEquals => matches!(
            ordering(value.as_str(), expected.as_str()),
            Some(Ordering::Less | Ordering::Equal)
        ),
        StringGreaterThanEquals => matches!(
            ordering(value.as_str(), expected.as_str()),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        NumericEquals => number_ordering(value, expected) == Some(Ordering::Equal),
        NumericLessThan => number_ordering(value, expected) == Some(Ordering::Less),
        NumericGreaterThan => number_ordering(value, expected) == Some(Ordering::Greater),
        NumericLessThanEquals => matches!(
            number_ordering(value, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        NumericGreaterThanEquals => matches!(
            number_ordering(value, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        TimestampEquals => timestamp_ordering(value, expected) == Some(Ordering::Equal),
        TimestampLessThan => timestamp_ordering(value, expected) == Some(Ordering::Less),
        TimestampGreaterThan => timestamp_ordering(value, expected) == Some(Ordering::Greater),
        TimestampLessThanEquals => matches!(
            timestamp_ordering(value, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        TimestampGreaterThanEquals => matches!(
            timestamp_ordering(value, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        IsPresent => expected.as_bool() == Some(true),
    }
}

fn ordering<T: Ord + ?Sized>(a: Option<&T>, b: Option<&T>) -> Option<Ordering> {
    Some(a?.cmp(b?))
}

fn number_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return Some(a.cmp(&b));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn timestamp_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    let a = parse_timestamp(a.as_str()?)?;
    let b = parse_timestamp(b.as_str()?)?;
    Some(a.cmp(&b))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|t| t.with_timezone(&Utc))
}

/// `StringMatches` pattern: `*` matches any run of characters, `\*` a literal star
fn wildcard_regex(glob: &str) -> Result<Regex, String> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => pattern.push_str(&regex::escape(&escaped.to_string())),
                None => pattern.push_str(&regex::escape("\\")),
            },
            '*' => pattern.push_str(".*"),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|err| err.to_string())
}

/// Picks the `Next` of the first matching rule, or `Default`
#[derive(Debug, Clone)]
pub struct ChoiceState {
    pub choices: Vec<(ChoiceRule, String)>,
    pub default: Option<String>,
    pub flow: DataFlow,
}

impl ChoiceState {
    pub fn compile(definition: &ChoiceStateDefinition) -> Result<Self, String> {
        let choices = definition
            .choices
            .iter()
            .flatten()
            .enumerate()
            .map(|(index, rule)| {
                let next = rule
                    .next
                    .clone()
                    .ok_or_else(|| format!("Choices[{}] does not have required field \"Next\"", index))?;
                let rule = ChoiceRule::compile(rule).map_err(|err| format!("Choices[{}] {}", index, err))?;
                Ok((rule, next))
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(ChoiceState {
            choices,
            default: definition.default.clone(),
            flow: DataFlow::compile(
                &definition.input_path,
                None,
                None,
                &PathField::Absent,
                &definition.output_path,
            )?,
        })
    }

    pub(crate) fn advance(&self, name: &str, ctx: &mut Context) -> Result<Advance, ExecutionError> {
        let input = self.flow.effective_input(ctx)?;
        let context = ctx.context_object();

        let next = self
            .choices
            .iter()
            .find(|(rule, _)| rule.matches(&input, &context))
            .map(|(_, next)| next)
            .or(self.default.as_ref())
            .ok_or_else(|| ExecutionError::NoChoiceMatched(name.to_string()))?;

        tracing::debug!(execution_id = %ctx.execution.id, state = %name, next = %next, "Choice made");

        Ok(Advance::Completed {
            output: self.flow.output(ctx, input)?,
            next: Some(next.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionInfo;
    use serde_json::json;

    fn rule(definition: Value) -> ChoiceRule {
        let definition: ChoiceRuleDefinition = serde_json::from_value(definition).unwrap();
        ChoiceRule::compile(&definition).unwrap()
    }

    fn check(definition: Value, input: Value) -> bool {
        rule(definition).matches(&input, &json!({}))
    }

    #[test]
    fn test_string_and_numeric_comparisons() {
        let input = json!({"name": "beta", "count": 10, "ratio": 0.5});
        assert!(check(json!({"Variable": "$.name", "StringEquals": "beta"}), input.clone()));
        assert!(check(json!({"Variable": "$.name", "StringGreaterThan": "alpha"}), input.clone()));
        assert!(!check(json!({"Variable": "$.name", "StringLessThan": "alpha"}), input.clone()));
        assert!(check(json!({"Variable": "$.count", "NumericGreaterThanEquals": 10}), input.clone()));
        assert!(check(json!({"Variable": "$.ratio", "NumericLessThan": 1}), input.clone()));
        assert!(!check(json!({"Variable": "$.name", "NumericEquals": 1}), input));
    }

    #[test]
    fn test_path_operands() {
        let input = json!({"low": 3, "high": 9});
        assert!(check(json!({"Variable": "$.low", "NumericLessThanPath": "$.high"}), input.clone()));
        assert!(!check(json!({"Variable": "$.low", "NumericEqualsPath": "$.missing"}), input));
    }

    #[test]
    fn test_string_matches() {
        let input = json!({"file": "report-2016.csv"});
        assert!(check(json!({"Variable": "$.file", "StringMatches": "report-*.csv"}), input.clone()));
        assert!(!check(json!({"Variable": "$.file", "StringMatches": "*.json"}), input));
        assert!(check(
            json!({"Variable": "$.file", "StringMatches": "a\\*b"}),
            json!({"file": "a*b"})
        ));
    }

    #[test]
    fn test_timestamps() {
        let input = json!({"at": "2016-03-14T01:59:00Z"});
        assert!(check(
            json!({"Variable": "$.at", "TimestampLessThan": "2016-03-14T02:00:00+00:00"}),
            input.clone()
        ));
        assert!(check(json!({"Variable": "$.at", "IsTimestamp": true}), input));
    }

    #[test]
    fn test_type_tests_and_missing_variables() {
        let input = json!({"nothing": null, "flag": false});
        assert!(check(json!({"Variable": "$.nothing", "IsNull": true}), input.clone()));
        assert!(check(json!({"Variable": "$.flag", "IsBoolean": true}), input.clone()));
        assert!(check(json!({"Variable": "$.flag", "BooleanEquals": false}), input.clone()));
        assert!(check(json!({"Variable": "$.absent", "IsPresent": false}), input.clone()));
        assert!(!check(json!({"Variable": "$.absent", "IsPresent": true}), input.clone()));
        assert!(!check(json!({"Variable": "$.absent", "StringEquals": "x"}), input));
    }

    #[test]
    fn test_boolean_combinators() {
        let input = json!({"a": 1, "b": "x"});
        assert!(check(
            json!({"And": [
                {"Variable": "$.a", "NumericEquals": 1},
                {"Not": {"Variable": "$.b", "StringEquals": "y"}}
            ]}),
            input.clone()
        ));
        assert!(check(
            json!({"Or": [
                {"Variable": "$.a", "NumericEquals": 2},
                {"Variable": "$.b", "StringEquals": "x"}
            ]}),
            input
        ));
    }

    fn choice_state() -> ChoiceState {
        let definition: ChoiceStateDefinition = serde_json::from_value(json!({
            "Choices": [
                {"Variable": "$.kind", "StringEquals": "book", "Next": "Books"},
                {"Variable": "$.kind", "StringEquals": "film", "Next": "Films"}
            ]
        }))
        .unwrap();
        ChoiceState::compile(&definition).unwrap()
    }

    fn advance(state: &ChoiceState, input: Value) -> Result<Advance, ExecutionError> {
        let mut ctx = Context::new(ExecutionInfo::new(input.clone()), input.clone());
        ctx.enter_state("Route", input, 0);
        state.advance("Route", &mut ctx)
    }

    #[test]
    fn test_first_match_wins() {
        let state = choice_state();
        assert_eq!(
            advance(&state, json!({"kind": "film"})).unwrap(),
            Advance::Completed {
                output: json!({"kind": "film"}),
                next: Some("Films".to_string())
            }
        );
    }

    #[test]
    fn test_default_and_no_match() {
        let mut state = choice_state();
        let err = advance(&state, json!({"kind": "game"})).unwrap_err();
        assert_eq!(err, ExecutionError::NoChoiceMatched("Route".to_string()));
        assert_eq!(err.error_name(), Some("States.NoChoiceMatched"));

        state.default = Some("Other".to_string());
        assert!(matches!(
            advance(&state, json!({"kind": "game"})).unwrap(),
            Advance::Completed { next: Some(next), .. } if next == "Other"
        ));
    }
}
