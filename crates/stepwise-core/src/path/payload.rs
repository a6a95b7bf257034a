use serde_json::{Map, Value};

use super::intrinsic::IntrinsicCall;
use super::Path;
use crate::error::{error_names, ExecutionError};

/// A compiled `Parameters`, `ItemSelector`, `ResultSelector` or `Credentials` value.
///
/// Keys ending in `.$` take their value from a path or an intrinsic call; the
/// suffix is dropped in the output. Everything else is copied as is.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadTemplate {
    Literal(Value),
    Object(Vec<(String, PayloadTemplate)>),
    Array(Vec<PayloadTemplate>),
    Path(Path),
    Call(IntrinsicCall),
}

impl PayloadTemplate {
    pub fn compile(template: &Value) -> Result<Self, String> {
        if !has_dynamic_entries(template) {
            return Ok(PayloadTemplate::Literal(template.clone()));
        }

        match template {
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    match key.strip_suffix(".$") {
                        Some(name) => entries.push((name.to_string(), Self::compile_expression(key, value)?)),
                        None => entries.push((key.clone(), Self::compile(value)?)),
                    }
                }
                Ok(PayloadTemplate::Object(entries))
            }
            Value::Array(items) => items
                .iter()
                .map(Self::compile)
                .collect::<Result<Vec<_>, _>>()
                .map(PayloadTemplate::Array),
            other => Ok(PayloadTemplate::Literal(other.clone())),
        }
    }

    fn compile_expression(key: &str, value: &Value) -> Result<Self, String> {
        let expression = value
            .as_str()
            .ok_or_else(|| format!("Value of \"{}\" must be a path or intrinsic function", key))?;

        if expression.starts_with('$') {
            Path::parse(expression).map(PayloadTemplate::Path).map_err(|err| err.message)
        } else {
            IntrinsicCall::parse(expression).map(PayloadTemplate::Call)
        }
    }

    /// Build the payload from `input`, resolving `$$` paths against `context`
    pub fn apply(&self, input: &Value, context: &Value) -> Result<Value, ExecutionError> {
        match self {
            PayloadTemplate::Literal(value) => Ok(value.clone()),
            PayloadTemplate::Object(entries) => {
                let mut out = Map::new();
                for (key, template) in entries {
                    out.insert(key.clone(), template.apply(input, context)?);
                }
                Ok(Value::Object(out))
            }
            PayloadTemplate::Array(items) => items
                .iter()
                .map(|item| item.apply(input, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            PayloadTemplate::Path(path) => path
                .evaluate(input, context)
                .map_err(|err| ExecutionError::path(error_names::PARAMETER_PATH_FAILURE, err)),
            PayloadTemplate::Call(call) => call.evaluate(input, context),
        }
    }
}

fn has_dynamic_entries(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.ends_with(".$") || has_dynamic_entries(value)),
        Value::Array(items) => items.iter().any(has_dynamic_entries),
        _ => false,
    }
}
