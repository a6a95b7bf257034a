use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::choice::ChoiceRuleDefinition;
use super::error_handling::{CatcherDefinition, RetrierDefinition};
use super::{PathField, StateMachineDefinition};

/// Every value accepted in a state's `Type` field
pub const STATE_TYPES: &[&str] = &[
    "Pass", "Task", "Wait", "Choice", "Succeed", "Fail", "Parallel", "Map",
];

/// A single state, tagged by its `Type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum StateDefinition {
    Pass(PassStateDefinition),
    Task(TaskStateDefinition),
    Wait(WaitStateDefinition),
    Choice(ChoiceStateDefinition),
    Succeed(SucceedStateDefinition),
    Fail(FailStateDefinition),
    Parallel(ParallelStateDefinition),
    Map(MapStateDefinition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PassStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TaskStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetrierDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatcherDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WaitStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceRuleDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SucceedStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FailStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ParallelStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<StateMachineDefinition>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetrierDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatcherDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MapStateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_path: Option<String>,
    #[serde(default, alias = "Iterator", skip_serializing_if = "Option::is_none")]
    pub item_processor: Option<Box<StateMachineDefinition>>,
    #[serde(default, alias = "Parameters", skip_serializing_if = "Option::is_none")]
    pub item_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerated_failure_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerated_failure_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetrierDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatcherDefinition>,
}

impl StateDefinition {
    /// The `Type` tag of this state
    pub fn state_type(&self) -> &'static str {
        match self {
            StateDefinition::Pass(_) => "Pass",
            StateDefinition::Task(_) => "Task",
            StateDefinition::Wait(_) => "Wait",
            StateDefinition::Choice(_) => "Choice",
            StateDefinition::Succeed(_) => "Succeed",
            StateDefinition::Fail(_) => "Fail",
            StateDefinition::Parallel(_) => "Parallel",
            StateDefinition::Map(_) => "Map",
        }
    }

    pub fn next(&self) -> Option<&str> {
        match self {
            StateDefinition::Pass(s) => s.next.as_deref(),
            StateDefinition::Task(s) => s.next.as_deref(),
            StateDefinition::Wait(s) => s.next.as_deref(),
            StateDefinition::Parallel(s) => s.next.as_deref(),
            StateDefinition::Map(s) => s.next.as_deref(),
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => None,
        }
    }

    /// Whether the state carries `End: true`
    pub fn is_end(&self) -> bool {
        match self {
            StateDefinition::Pass(s) => s.end,
            StateDefinition::Task(s) => s.end,
            StateDefinition::Wait(s) => s.end,
            StateDefinition::Parallel(s) => s.end,
            StateDefinition::Map(s) => s.end,
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_) => false,
        }
    }

    /// Whether the state must carry exactly one of `Next` or `End`.
    /// Choice transitions through its rules; Succeed and Fail are terminal.
    pub fn requires_transition(&self) -> bool {
        !matches!(
            self,
            StateDefinition::Choice(_) | StateDefinition::Succeed(_) | StateDefinition::Fail(_)
        )
    }

    pub fn is_terminal_type(&self) -> bool {
        matches!(self, StateDefinition::Succeed(_) | StateDefinition::Fail(_))
    }

    pub fn retriers(&self) -> &[RetrierDefinition] {
        match self {
            StateDefinition::Task(s) => &s.retry,
            StateDefinition::Parallel(s) => &s.retry,
            StateDefinition::Map(s) => &s.retry,
            _ => &[],
        }
    }

    pub fn catchers(&self) -> &[CatcherDefinition] {
        match self {
            StateDefinition::Task(s) => &s.catch,
            StateDefinition::Parallel(s) => &s.catch,
            StateDefinition::Map(s) => &s.catch,
            _ => &[],
        }
    }

    /// Nested graphs with the label used to prefix their graph-level errors
    pub fn nested_graphs(&self) -> Vec<(String, &StateMachineDefinition)> {
        match self {
            StateDefinition::Map(s) => s
                .item_processor
                .as_deref()
                .map(|graph| vec![("ItemProcessor".to_string(), graph)])
                .unwrap_or_default(),
            StateDefinition::Parallel(s) => s
                .branches
                .iter()
                .flatten()
                .enumerate()
                .map(|(i, graph)| (format!("Branches[{}]", i), graph))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The `InputPath`, `OutputPath` and `ResultPath` fields this state carries
    pub fn path_fields(&self) -> Vec<(&'static str, &PathField)> {
        let (input, output, result) = match self {
            StateDefinition::Pass(s) => (Some(&s.input_path), Some(&s.output_path), Some(&s.result_path)),
            StateDefinition::Task(s) => (Some(&s.input_path), Some(&s.output_path), Some(&s.result_path)),
            StateDefinition::Wait(s) => (Some(&s.input_path), Some(&s.output_path), None),
            StateDefinition::Choice(s) => (Some(&s.input_path), Some(&s.output_path), None),
            StateDefinition::Succeed(s) => (Some(&s.input_path), Some(&s.output_path), None),
            StateDefinition::Fail(_) => (None, None, None),
            StateDefinition::Parallel(s) => (Some(&s.input_path), Some(&s.output_path), Some(&s.result_path)),
            StateDefinition::Map(s) => (Some(&s.input_path), Some(&s.output_path), Some(&s.result_path)),
        };

        let mut fields = Vec::new();
        if let Some(path) = input {
            fields.push(("InputPath", path));
        }
        if let Some(path) = output {
            fields.push(("OutputPath", path));
        }
        if let Some(path) = result {
            fields.push(("ResultPath", path));
        }
        fields
    }

    /// Payload templates this state carries, by field name
    pub fn templates(&self) -> Vec<(&'static str, &Value)> {
        let names: &[&'static str] = match self {
            StateDefinition::Pass(_) => &["Parameters"],
            StateDefinition::Task(_) => &["Parameters", "ResultSelector", "Credentials"],
            StateDefinition::Parallel(_) => &["Parameters", "ResultSelector"],
            StateDefinition::Map(_) => &["ItemSelector", "ResultSelector"],
            _ => &[],
        };
        names
            .iter()
            .filter_map(|name| self.template(name).map(|value| (*name, value)))
            .collect()
    }

    fn template(&self, name: &str) -> Option<&Value> {
        match (self, name) {
            (StateDefinition::Pass(s), "Parameters") => s.parameters.as_ref(),
            (StateDefinition::Task(s), "Parameters") => s.parameters.as_ref(),
            (StateDefinition::Task(s), "ResultSelector") => s.result_selector.as_ref(),
            (StateDefinition::Task(s), "Credentials") => s.credentials.as_ref(),
            (StateDefinition::Parallel(s), "Parameters") => s.parameters.as_ref(),
            (StateDefinition::Parallel(s), "ResultSelector") => s.result_selector.as_ref(),
            (StateDefinition::Map(s), "ItemSelector") => s.item_selector.as_ref(),
            (StateDefinition::Map(s), "ResultSelector") => s.result_selector.as_ref(),
            _ => None,
        }
    }
}
