use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed answer stored under a dotted field path such as `customer.name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_filled(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::Number(_) => true,
            Self::List(items) => !items.is_empty(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.normalize().to_string(),
            Self::List(items) => items.join(", "),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(number) => Value::String(number.normalize().to_string()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// Fields extracted from a single user message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldDelta {
    entries: BTreeMap<String, FieldValue>,
}

impl FieldDelta {
    pub fn set(&mut self, path: impl Into<String>, value: FieldValue) {
        if value.is_filled() {
            self.entries.insert(path.into(), value);
        }
    }

    pub fn set_text(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.set(path, FieldValue::Text(text.into()));
    }

    pub fn set_number(&mut self, path: impl Into<String>, number: Decimal) {
        self.set(path, FieldValue::Number(number));
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(path, value)| (path.as_str(), value))
    }

    /// Later deltas win on the same path.
    pub fn absorb(&mut self, other: FieldDelta) {
        self.entries.extend(other.entries);
    }
}

/// Everything collected so far in one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialState {
    fields: BTreeMap<String, FieldValue>,
}

impl PartialState {
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        match self.fields.get(path) {
            Some(FieldValue::Text(text)) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn number(&self, path: &str) -> Option<Decimal> {
        match self.fields.get(path) {
            Some(FieldValue::Number(number)) => Some(*number),
            _ => None,
        }
    }

    pub fn list(&self, path: &str) -> Option<&[String]> {
        match self.fields.get(path) {
            Some(FieldValue::List(items)) if !items.is_empty() => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn is_filled(&self, path: &str) -> bool {
        self.fields.get(path).is_some_and(FieldValue::is_filled)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(path, value)| (path.as_str(), value))
    }

    /// Overwrites by path and never deletes, so merging the same delta twice
    /// leaves the state unchanged.
    pub fn merge(&mut self, delta: &FieldDelta) {
        for (path, value) in delta.iter() {
            self.fields.insert(path.to_owned(), value.clone());
        }
    }

    /// Drops a rejected answer. Merges never delete, so this is the only way
    /// a filled path becomes unfilled.
    pub fn remove(&mut self, path: &str) -> Option<FieldValue> {
        self.fields.remove(path)
    }

    pub fn merged(&self, delta: &FieldDelta) -> Self {
        let mut next = self.clone();
        next.merge(delta);
        next
    }

    /// Nested JSON view, e.g. `customer.name` becomes `{"customer": {"name": ..}}`.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (path, value) in &self.fields {
            insert_nested(&mut root, path, value.to_json());
        }
        Value::Object(root)
    }
}

fn insert_nested(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut cursor = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            cursor.insert(segment.to_owned(), value);
            return;
        }
        let slot = cursor.entry(segment.to_owned()).or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cursor = next;
    }
}
