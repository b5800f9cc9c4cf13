//! Decoded relation nodes.
//!
//! A node is one exported entity instance: its scalar attributes plus the
//! raw JSON of its nested relations. Children stay undecoded until the
//! walk visits them, so a malformed grandchild cannot poison its parent.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::registry::RelationDefinition;

#[derive(Debug, Clone)]
pub struct RelationNode {
    pub attributes: Map<String, Value>,
    children: HashMap<String, Vec<Value>>,
}

impl RelationNode {
    /// Splits a raw exported object into attributes and nested relation
    /// values, using the definition's declared children. Anything that is
    /// not an object is a schema error for this node.
    pub fn from_value(def: &RelationDefinition, value: Value) -> Result<Self, SchemaError> {
        let obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(SchemaError(format!(
                    "expected an attribute object for {}, got {}",
                    def.kind.as_str(),
                    json_kind(&other)
                )))
            }
        };

        let mut attributes = Map::new();
        let mut children: HashMap<String, Vec<Value>> = HashMap::new();

        for (key, value) in obj {
            match def.children.iter().find(|c| c.name == key) {
                Some(_) => {
                    children.insert(key, normalize_cardinality(value));
                }
                None => {
                    attributes.insert(key, value);
                }
            }
        }

        Ok(RelationNode {
            attributes,
            children,
        })
    }

    /// Raw values for a nested relation, in source order. Missing relations
    /// are a normal case and yield an empty slice.
    pub fn child_values(&self, relation: &str) -> &[Value] {
        self.children
            .get(relation)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Collections arrive as arrays, single relations as bare objects, and
/// either may be null in older exports. All of these normalize to a list.
pub fn normalize_cardinality(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
