//! Serde model of a state-machine document.
//!
//! Field names follow the document's PascalCase spelling. Fields that a state
//! type requires are still `Option`s here so that a missing field surfaces as a
//! validation error naming the state instead of a bare deserialization failure.

mod choice;
mod error_handling;
mod state;
mod state_map;

pub use choice::{ChoiceRuleDefinition, ComparisonOperator};
pub use error_handling::{CatcherDefinition, JitterStrategy, RetrierDefinition};
pub use state::{
    ChoiceStateDefinition, FailStateDefinition, MapStateDefinition, ParallelStateDefinition,
    PassStateDefinition, StateDefinition, SucceedStateDefinition, TaskStateDefinition,
    WaitStateDefinition, STATE_TYPES,
};
pub use state_map::StateMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A state graph: the top-level document, an `ItemProcessor`, or one of a
/// Parallel state's `Branches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<StateMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl StateMachineDefinition {
    /// Look up a state of this graph by name
    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states.as_ref().and_then(|states| states.get(name))
    }

    /// Whether this graph declares a state with the given name
    pub fn contains_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }
}

/// A path field that distinguishes "not given" from an explicit `null`.
///
/// `InputPath`/`OutputPath` set to `null` select an empty object and a `null`
/// `ResultPath` discards the state's result, so both cases must survive parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathField {
    #[default]
    Absent,
    Null,
    Path(String),
}

impl PathField {
    pub fn is_absent(&self) -> bool {
        matches!(self, PathField::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PathField::Null)
    }

    /// The path expression, when one was given
    pub fn as_path(&self) -> Option<&str> {
        match self {
            PathField::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl From<&str> for PathField {
    fn from(path: &str) -> Self {
        PathField::Path(path.to_string())
    }
}

impl Serialize for PathField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathField::Path(path) => serializer.serialize_str(path),
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for PathField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Absence is handled by `#[serde(default)]` on the owning field.
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(path) => PathField::Path(path),
            None => PathField::Null,
        })
    }
}
