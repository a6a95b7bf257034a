use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::state::{StateDefinition, STATE_TYPES};

/// The `States` object of a graph, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateMap(Vec<(String, StateDefinition)>);

impl StateMap {
    pub fn new(states: Vec<(String, StateDefinition)>) -> Self {
        StateMap(states)
    }

    pub fn get(&self, name: &str) -> Option<&StateDefinition> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, state)| state)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateDefinition)> {
        self.0.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for StateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, state) in &self.0 {
            map.serialize_entry(name, state)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StateMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StateMapVisitor)
    }
}

struct StateMapVisitor;

impl<'de> Visitor<'de> for StateMapVisitor {
    type Value = StateMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object mapping state names to state definitions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut states = Vec::with_capacity(access.size_hint().unwrap_or(0));

        while let Some((name, raw)) = access.next_entry::<String, Value>()? {
            if states.iter().any(|(existing, _)| existing == &name) {
                return Err(de::Error::custom(format!("States.{} is declared more than once", name)));
            }

            match raw.get("Type") {
                None => {
                    return Err(de::Error::custom(format!(
                        "States.{} does not have required field \"Type\"",
                        name
                    )))
                }
                Some(Value::String(t)) if STATE_TYPES.contains(&t.as_str()) => {}
                Some(other) => {
                    let shown = other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string());
                    return Err(de::Error::custom(format!(
                        "States.{} field \"Type\" value \"{}\" is not valid",
                        name, shown
                    )));
                }
            }

            let state = serde_json::from_value::<StateDefinition>(raw).map_err(|err| {
                let message = err.to_string();
                // Errors from nested graphs already name their state.
                if message.starts_with("States.") {
                    de::Error::custom(message)
                } else {
                    de::Error::custom(format!("States.{}: {}", name, message))
                }
            })?;

            states.push((name, state));
        }

        Ok(StateMap(states))
    }
}
