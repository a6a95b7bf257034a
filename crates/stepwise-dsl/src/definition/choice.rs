use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One rule of a Choice state's `Choices`, or a nested rule inside `And`/`Or`/`Not`.
///
/// The comparison operator is kept as the remaining keys of the rule so that an
/// unknown or duplicated operator can be reported by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceRuleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<ChoiceRuleDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<ChoiceRuleDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<ChoiceRuleDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub comparisons: Map<String, Value>,
}

impl ChoiceRuleDefinition {
    /// Whether the rule combines other rules rather than comparing a variable
    pub fn is_boolean_expression(&self) -> bool {
        self.and.is_some() || self.or.is_some() || self.not.is_some()
    }

    /// Number of operator keys (comparisons plus `And`/`Or`/`Not`) on this rule
    pub fn operator_count(&self) -> usize {
        self.comparisons.len()
            + usize::from(self.and.is_some())
            + usize::from(self.or.is_some())
            + usize::from(self.not.is_some())
    }

    /// The single comparison operator of the rule, if it has exactly one
    pub fn comparison(&self) -> Option<(&str, &Value)> {
        if self.comparisons.len() != 1 {
            return None;
        }
        self.comparisons.iter().next().map(|(key, value)| (key.as_str(), value))
    }
}

/// Comparison operators of a choice rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    StringEquals,
    StringLessThan,
    StringGreaterThan,
    StringLessThanEquals,
    StringGreaterThanEquals,
    StringMatches,
    NumericEquals,
    NumericLessThan,
    NumericGreaterThan,
    NumericLessThanEquals,
    NumericGreaterThanEquals,
    BooleanEquals,
    TimestampEquals,
    TimestampLessThan,
    TimestampGreaterThan,
    TimestampLessThanEquals,
    TimestampGreaterThanEquals,
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

const OPERATORS: &[(&str, ComparisonOperator)] = &[
    ("StringEquals", ComparisonOperator::StringEquals),
    ("StringLessThan", ComparisonOperator::StringLessThan),
    ("StringGreaterThan", ComparisonOperator::StringGreaterThan),
    ("StringLessThanEquals", ComparisonOperator::StringLessThanEquals),
    ("StringGreaterThanEquals", ComparisonOperator::StringGreaterThanEquals),
    ("StringMatches", ComparisonOperator::StringMatches),
    ("NumericEquals", ComparisonOperator::NumericEquals),
    ("NumericLessThan", ComparisonOperator::NumericLessThan),
    ("NumericGreaterThan", ComparisonOperator::NumericGreaterThan),
    ("NumericLessThanEquals", ComparisonOperator::NumericLessThanEquals),
    ("NumericGreaterThanEquals", ComparisonOperator::NumericGreaterThanEquals),
    ("BooleanEquals", ComparisonOperator::BooleanEquals),
    ("TimestampEquals", ComparisonOperator::TimestampEquals),
    ("TimestampLessThan", ComparisonOperator::TimestampLessThan),
    ("TimestampGreaterThan", ComparisonOperator::TimestampGreaterThan),
    ("TimestampLessThanEquals", ComparisonOperator::TimestampLessThanEquals),
    ("TimestampGreaterThanEquals", ComparisonOperator::TimestampGreaterThanEquals),
    ("IsNull", ComparisonOperator::IsNull),
    ("IsPresent", ComparisonOperator::IsPresent),
    ("IsNumeric", ComparisonOperator::IsNumeric),
    ("IsString", ComparisonOperator::IsString),
    ("IsBoolean", ComparisonOperator::IsBoolean),
    ("IsTimestamp", ComparisonOperator::IsTimestamp),
];

impl ComparisonOperator {
    /// Parse an operator key. The boolean is true for the `…Path` form, whose
    /// operand is a path to compare against instead of a literal.
    pub fn from_key(key: &str) -> Option<(Self, bool)> {
        if let Some(op) = Self::lookup(key) {
            return Some((op, false));
        }
        let base = key.strip_suffix("Path")?;
        let op = Self::lookup(base)?;
        if op.is_type_test() || op == ComparisonOperator::StringMatches {
            return None;
        }
        Some((op, true))
    }

    fn lookup(key: &str) -> Option<Self> {
        OPERATORS.iter().find(|(name, _)| *name == key).map(|(_, op)| *op)
    }

    pub fn name(&self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(name, _)| *name)
            .unwrap_or("Unknown")
    }

    /// `IsNull`, `IsPresent` and friends take a boolean operand
    pub fn is_type_test(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::IsNull
                | ComparisonOperator::IsPresent
                | ComparisonOperator::IsNumeric
                | ComparisonOperator::IsString
                | ComparisonOperator::IsBoolean
                | ComparisonOperator::IsTimestamp
        )
    }

    /// Whether a literal operand has the JSON type this operator expects
    pub fn accepts_literal(&self, operand: &Value) -> bool {
        use ComparisonOperator::*;
        match self {
            StringEquals | StringLessThan | StringGreaterThan | StringLessThanEquals
            | StringGreaterThanEquals | StringMatches | TimestampEquals | TimestampLessThan
            | TimestampGreaterThan | TimestampLessThanEquals | TimestampGreaterThanEquals => {
                operand.is_string()
            }
            NumericEquals | NumericLessThan | NumericGreaterThan | NumericLessThanEquals
            | NumericGreaterThanEquals => operand.is_number(),
            BooleanEquals | IsNull | IsPresent | IsNumeric | IsString | IsBoolean | IsTimestamp => {
                operand.is_boolean()
            }
        }
    }
}
