//! Intrinsic functions usable as the value of a `.$` template entry,
//! for example `States.Format('Hello {}', $.name)`.

use serde_json::Value;
use uuid::Uuid;

use super::Path;
use crate::error::ExecutionError;

/// An argument of an intrinsic call
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    Path(Path),
    Call(IntrinsicCall),
}

/// A parsed intrinsic function call
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCall {
    name: String,
    args: Vec<Argument>,
}

/// (name, minimum args, maximum args)
const FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("Format", 1, None),
    ("StringToJson", 1, Some(1)),
    ("JsonToString", 1, Some(1)),
    ("Array", 0, None),
    ("ArrayLength", 1, Some(1)),
    ("ArrayContains", 2, Some(2)),
    ("ArrayUnique", 1, Some(1)),
    ("MathAdd", 2, Some(2)),
    ("UUID", 0, Some(0)),
];

impl IntrinsicCall {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let mut parser = Parser { text: expression, pos: 0 };
        let call = parser.call()?;
        parser.skip_whitespace();
        if parser.pos != expression.len() {
            return Err(format!("Unexpected text after intrinsic call in \"{}\"", expression));
        }
        Ok(call)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, input: &Value, context: &Value) -> Result<Value, ExecutionError> {
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.push(match arg {
                Argument::Literal(value) => value.clone(),
                Argument::Path(path) => path
                    .evaluate(input, context)
                    .map_err(|err| self.failure(&err.message))?,
                Argument::Call(call) => call.evaluate(input, context)?,
            });
        }

        match self.name.as_str() {
            "Format" => self.format(&args),
            "StringToJson" => {
                let text = args[0].as_str().ok_or_else(|| self.failure("argument must be a string"))?;
                serde_json::from_str(text).map_err(|err| self.failure(&err.to_string()))
            }
            "JsonToString" => serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|err| self.failure(&err.to_string())),
            "Array" => Ok(Value::Array(args)),
            "ArrayLength" => {
                let items = self.array_arg(&args[0])?;
                Ok(Value::from(items.len()))
            }
            "ArrayContains" => {
                let items = self.array_arg(&args[0])?;
                Ok(Value::Bool(items.contains(&args[1])))
            }
            "ArrayUnique" => {
                let items = self.array_arg(&args[0])?;
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(item) {
                        unique.push(item.clone());
                    }
                }
                Ok(Value::Array(unique))
            }
            "MathAdd" => self.math_add(&args[0], &args[1]),
            "UUID" => Ok(Value::String(Uuid::new_v4().to_string())),
            other => Err(self.failure(&format!("unknown function States.{}", other))),
        }
    }

    fn format(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        let template = args[0]
            .as_str()
            .ok_or_else(|| self.failure("first argument must be a string"))?;
        let values = &args[1..];

        let placeholders = template.matches("{}").count();
        if placeholders != values.len() {
            return Err(self.failure(&format!(
                "got {} arguments for {} placeholders",
                values.len(),
                placeholders
            )));
        }

        let mut out = String::with_capacity(template.len());
        let mut pieces = template.split("{}");
        if let Some(first) = pieces.next() {
            out.push_str(first);
        }
        for (piece, value) in pieces.zip(values) {
            match value {
                Value::String(text) => out.push_str(text),
                other => out.push_str(&other.to_string()),
            }
            out.push_str(piece);
        }
        Ok(Value::String(out))
    }

    fn math_add(&self, a: &Value, b: &Value) -> Result<Value, ExecutionError> {
        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            return a
                .checked_add(b)
                .map(Value::from)
                .ok_or_else(|| self.failure("integer overflow"));
        }
        match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::from(a + b)),
            _ => Err(self.failure("arguments must be numbers")),
        }
    }

    fn array_arg<'a>(&self, value: &'a Value) -> Result<&'a Vec<Value>, ExecutionError> {
        value
            .as_array()
            .ok_or_else(|| self.failure("first argument must be an array"))
    }

    fn failure(&self, detail: &str) -> ExecutionError {
        ExecutionError::Intrinsic(format!("States.{}: {}", self.name, detail))
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn expect(&mut self, token: char) -> Result<(), String> {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len_utf8();
            Ok(())
        } else {
            Err(format!("Expected '{}' at position {} in \"{}\"", token, self.pos, self.text))
        }
    }

    fn call(&mut self) -> Result<IntrinsicCall, String> {
        self.skip_whitespace();
        let rest = self
            .rest()
            .strip_prefix("States.")
            .ok_or_else(|| format!("Intrinsic call must start with \"States.\": \"{}\"", self.text))?;
        let name_len = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
        let name = rest[..name_len].to_string();
        self.pos += "States.".len() + name_len;

        let (_, min, max) = FUNCTIONS
            .iter()
            .find(|(known, _, _)| *known == name)
            .ok_or_else(|| format!("Unknown intrinsic function States.{}", name))?;

        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.rest().starts_with(')') {
            self.pos += 1;
        } else {
            loop {
                args.push(self.argument()?);
                self.skip_whitespace();
                if self.rest().starts_with(',') {
                    self.pos += 1;
                } else {
                    self.expect(')')?;
                    break;
                }
            }
        }

        if args.len() < *min || max.is_some_and(|max| args.len() > max) {
            return Err(format!("States.{} called with {} arguments", name, args.len()));
        }

        Ok(IntrinsicCall { name, args })
    }

    fn argument(&mut self) -> Result<Argument, String> {
        self.skip_whitespace();
        let rest = self.rest();

        if rest.starts_with('\'') {
            return self.string_literal().map(|s| Argument::Literal(Value::String(s)));
        }
        if rest.starts_with("States.") {
            return self.call().map(Argument::Call);
        }

        let token = self.token();
        if token.starts_with('$') {
            Path::parse(token)
                .map(Argument::Path)
                .map_err(|err| err.message)
        } else {
            serde_json::from_str(token)
                .map(Argument::Literal)
                .map_err(|_| format!("Invalid intrinsic argument \"{}\"", token))
        }
    }

    /// Read up to the next top-level ',' or ')'
    fn token(&mut self) -> &'a str {
        let rest = self.rest();
        let mut depth = 0i32;
        let mut quote = None;
        let mut end = rest.len();
        for (at, c) in rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'') | (None, '"') => quote = Some(c),
                (None, '[') | (None, '(') => depth += 1,
                (None, ']') => depth -= 1,
                (None, ')') if depth > 0 => depth -= 1,
                (None, ')') | (None, ',') if depth == 0 => {
                    end = at;
                    break;
                }
                _ => {}
            }
        }
        self.pos += end;
        rest[..end].trim()
    }

    fn string_literal(&mut self) -> Result<String, String> {
        // Skip the opening quote
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((at, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                }
                '\'' => {
                    self.pos += at + 1;
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(format!("Unterminated string in \"{}\"", self.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(expression: &str, input: &Value) -> Result<Value, ExecutionError> {
        IntrinsicCall::parse(expression).unwrap().evaluate(input, &json!({}))
    }

    #[test]
    fn test_format() {
        let input = json!({"name": "Ada", "count": 3});
        assert_eq!(
            call("States.Format('Hello {}, you have {} items', $.name, $.count)", &input).unwrap(),
            json!("Hello Ada, you have 3 items")
        );
        assert_eq!(
            call("States.Format('It\\'s {}', 'fine')", &input).unwrap(),
            json!("It's fine")
        );
        assert!(call("States.Format('{} {}', $.name)", &input).is_err());
    }

    #[test]
    fn test_json_conversions() {
        let input = json!({"raw": "{\"a\":[1,2]}", "obj": {"b": true}});
        assert_eq!(call("States.StringToJson($.raw)", &input).unwrap(), json!({"a": [1, 2]}));
        assert_eq!(call("States.JsonToString($.obj)", &input).unwrap(), json!("{\"b\":true}"));
    }

    #[test]
    fn test_array_functions() {
        let input = json!({"items": [1, 2, 2, 3, 1]});
        assert_eq!(call("States.Array(1, 'two', $.items[0])", &input).unwrap(), json!([1, "two", 1]));
        assert_eq!(call("States.ArrayLength($.items)", &input).unwrap(), json!(5));
        assert_eq!(call("States.ArrayContains($.items, 3)", &input).unwrap(), json!(true));
        assert_eq!(call("States.ArrayContains($.items, 9)", &input).unwrap(), json!(false));
        assert_eq!(call("States.ArrayUnique($.items)", &input).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_math_add_and_nesting() {
        let input = json!({"a": 40, "b": 2.5});
        assert_eq!(call("States.MathAdd($.a, 2)", &input).unwrap(), json!(42));
        assert_eq!(call("States.MathAdd($.a, $.b)", &input).unwrap(), json!(42.5));
        assert_eq!(
            call("States.ArrayLength(States.Array($.a, $.b))", &input).unwrap(),
            json!(2)
        );
    }

    #[test]
    fn test_uuid() {
        let value = call("States.UUID()", &json!({})).unwrap();
        let text = value.as_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }

    #[test]
    fn test_failures_are_intrinsic_errors() {
        let err = call("States.ArrayLength($.missing)", &json!({})).unwrap_err();
        assert_eq!(err.error_name(), Some("States.IntrinsicFailure"));

        let err = call("States.StringToJson('not json')", &json!({})).unwrap_err();
        assert!(matches!(err, ExecutionError::Intrinsic(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(IntrinsicCall::parse("States.Teleport()").is_err());
        assert!(IntrinsicCall::parse("States.UUID(1)").is_err());
        assert!(IntrinsicCall::parse("States.Format('x'").is_err());
        assert!(IntrinsicCall::parse("Format('x')").is_err());
    }
}
