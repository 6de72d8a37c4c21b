//! Diffable representation settings.
//!
//! [`RepresentationState`] maps named properties to values plus a
//! per-property modified flag, so an updater can tell which settings
//! actually changed between two runs and recolor instead of rebuilding.
//! The struct itself is not synchronized; its owner mutates it under the
//! owner's lock.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;

/// Value of a single representation property.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StateValue {
    /// Boolean property (visibility, outline on/off, ...).
    Bool(bool),
    /// Integer property (slice index, contour width, ...).
    Int(i64),
    /// Floating point property (opacity, contrast, ...).
    Number(f64),
    /// Text property (color table name, ...).
    Text(String),
    /// Vector property (crosshair, spacing, ...).
    Vector(Vector3),
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Number(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Text(v.to_string())
    }
}

impl From<Vector3> for StateValue {
    fn from(v: Vector3) -> Self {
        StateValue::Vector(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Entry {
    value: StateValue,
    modified: bool,
}

/// Mapping of property tags to (value, modified) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RepresentationState {
    values: HashMap<String, Entry>,
}

impl RepresentationState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for `tag`, marking it modified only if it changed.
    ///
    /// Re-setting an equal value does not dirty the property; setting a
    /// different value leaves it dirty until [`commit`](Self::commit).
    pub fn set_value<V: Into<StateValue>>(&mut self, tag: &str, value: V) {
        let value = value.into();
        match self.values.get_mut(tag) {
            Some(entry) => {
                if entry.value != value {
                    entry.value = value;
                    entry.modified = true;
                }
            }
            None => {
                self.values.insert(
                    tag.to_string(),
                    Entry {
                        value,
                        modified: true,
                    },
                );
            }
        }
    }

    /// Returns the value for `tag`, if present.
    #[must_use]
    pub fn get_value(&self, tag: &str) -> Option<&StateValue> {
        self.values.get(tag).map(|entry| &entry.value)
    }

    /// Returns true if `tag` has been modified since the last commit.
    #[must_use]
    pub fn is_modified(&self, tag: &str) -> bool {
        self.values.get(tag).is_some_and(|entry| entry.modified)
    }

    /// Returns true if any property has been modified since the last commit.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.values.values().any(|entry| entry.modified)
    }

    /// Merges another state's values into this one.
    ///
    /// Each incoming value goes through [`set_value`](Self::set_value), so
    /// only genuine differences become dirty.
    pub fn apply(&mut self, other: &RepresentationState) {
        for (tag, entry) in &other.values {
            self.set_value(tag, entry.value.clone());
        }
    }

    /// Clears every modified flag.
    pub fn commit(&mut self) {
        for entry in self.values.values_mut() {
            entry.modified = false;
        }
    }

    /// Removes every property.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Returns the tags of the properties currently dirty.
    #[must_use]
    pub fn modified_tags(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, entry)| entry.modified)
            .map(|(tag, _)| tag.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut state = RepresentationState::new();
        state.set_value("opacity", 0.5);
        assert_eq!(state.get_value("opacity"), Some(&StateValue::Number(0.5)));
    }

    #[test]
    fn equal_value_does_not_dirty() {
        let mut state = RepresentationState::new();
        state.set_value("visible", true);
        state.commit();

        state.set_value("visible", true);
        assert!(!state.is_modified("visible"));
        assert!(!state.has_pending_changes());

        state.set_value("visible", false);
        assert!(state.is_modified("visible"));
        state.commit();
        assert!(!state.is_modified("visible"));
    }

    #[test]
    fn apply_twice_with_same_settings_is_idempotent() {
        let mut settings = RepresentationState::new();
        settings.set_value("lut", "grayscale");
        settings.set_value("opacity", 1.0);

        let mut state = RepresentationState::new();
        state.apply(&settings);
        assert!(state.has_pending_changes());
        state.commit();

        state.apply(&settings);
        assert!(!state.has_pending_changes());
    }

    #[test]
    fn modified_tags_lists_only_dirty_entries() {
        let mut state = RepresentationState::new();
        state.set_value("a", 1i64);
        state.set_value("b", 2i64);
        state.commit();
        state.set_value("b", 3i64);

        assert_eq!(state.modified_tags(), vec!["b"]);
    }
}
