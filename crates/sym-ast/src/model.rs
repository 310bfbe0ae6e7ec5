//! Satisfying assignments read back from the solver.

use std::collections::BTreeMap;

use serde::Serialize;

/// One assigned variable: value and bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub value: u32,
    pub width: u8,
}

/// Mapping from variable name to assigned value.
///
/// Built by parsing a `sat` solver response; the names are the free
/// variables declared in the query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Model {
    variables: BTreeMap<String, ModelEntry>,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assignment. A later assignment for the same name wins.
    pub fn add_variable(&mut self, name: &str, value: u32, width: u8) {
        self.variables
            .insert(name.to_string(), ModelEntry { value, width });
    }

    /// Assigned value of a variable, if present.
    #[must_use]
    pub fn variable_value(&self, name: &str) -> Option<u32> {
        self.variables.get(name).map(|e| e.value)
    }

    /// Bit width of a variable's assignment, if present.
    #[must_use]
    pub fn variable_width(&self, name: &str) -> Option<u8> {
        self.variables.get(name).map(|e| e.width)
    }

    /// Iterate assignments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ModelEntry)> {
        self.variables.iter().map(|(n, e)| (n.as_str(), *e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
