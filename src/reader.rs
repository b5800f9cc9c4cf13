//! Reader strategies over the serialized export.
//!
//! Two interchangeable sources satisfy one contract: a monolithic decoded
//! document held in memory, and a sharded directory with one unit per
//! top-level relation, decoded on demand. A relation missing from the
//! source is a normal case (older exports lack newer relations) and yields
//! an empty result, never an error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::node::normalize_cardinality;

pub trait RelationReader {
    /// Portable attributes of the root entity, with relation keys removed.
    fn root_attributes(&mut self) -> anyhow::Result<Map<String, Value>>;

    /// Raw node values for one top-level relation, in source order.
    /// Single-cardinality relations yield at most one element.
    fn consume_relation(&mut self, relation: &str) -> anyhow::Result<Vec<Value>>;
}

/// Whole export decoded as one document. Lookups index into it; consuming
/// a relation removes its key so root attributes stay disjoint from
/// relation payloads.
pub struct MonolithicReader {
    document: Map<String, Value>,
    relation_names: Vec<&'static str>,
}

impl MonolithicReader {
    pub fn new(document: Value, relation_names: Vec<&'static str>) -> anyhow::Result<Self> {
        let document = match document {
            Value::Object(obj) => obj,
            _ => anyhow::bail!("export document root must be an object"),
        };
        Ok(MonolithicReader {
            document,
            relation_names,
        })
    }

    pub fn from_str(json: &str, relation_names: Vec<&'static str>) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(json).context("failed to decode export json")?;
        Self::new(value, relation_names)
    }

    pub fn from_file(path: &Path, relation_names: Vec<&'static str>) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read export {}", path.to_string_lossy()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode export {}", path.to_string_lossy()))?;
        Self::new(value, relation_names)
    }
}

impl RelationReader for MonolithicReader {
    fn root_attributes(&mut self) -> anyhow::Result<Map<String, Value>> {
        let mut attrs = Map::new();
        for (key, value) in &self.document {
            if !self.relation_names.iter().any(|n| *n == key.as_str()) {
                attrs.insert(key.clone(), value.clone());
            }
        }
        Ok(attrs)
    }

    fn consume_relation(&mut self, relation: &str) -> anyhow::Result<Vec<Value>> {
        match self.document.remove(relation) {
            Some(value) => Ok(normalize_cardinality(value)),
            None => Ok(Vec::new()),
        }
    }
}

/// Export split into one unit per top-level relation: `project.json` holds
/// the root attributes, `<relation>.ndjson` holds one JSON object per line.
/// Units are decoded on demand.
pub struct ShardedReader {
    dir: PathBuf,
    relation_names: Vec<&'static str>,
}

impl ShardedReader {
    pub fn new(dir: &Path, relation_names: Vec<&'static str>) -> Self {
        ShardedReader {
            dir: dir.to_path_buf(),
            relation_names,
        }
    }
}

impl RelationReader for ShardedReader {
    fn root_attributes(&mut self) -> anyhow::Result<Map<String, Value>> {
        let path = self.dir.join("project.json");
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read root unit {}", path.to_string_lossy()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode root unit {}", path.to_string_lossy()))?;
        let obj = match value {
            Value::Object(obj) => obj,
            _ => anyhow::bail!("root unit must be an object"),
        };

        // A sharded export should not embed relations in the root unit,
        // but tolerate it the way the monolithic reader does.
        let mut attrs = Map::new();
        for (key, value) in obj {
            if !self.relation_names.iter().any(|n| *n == key.as_str()) {
                attrs.insert(key, value);
            }
        }
        Ok(attrs)
    }

    fn consume_relation(&mut self, relation: &str) -> anyhow::Result<Vec<Value>> {
        let path = self.dir.join(format!("{relation}.ndjson"));
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open relation unit {}", path.to_string_lossy()))?;
        let reader = BufReader::new(file);

        let mut values = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line
                .with_context(|| format!("failed to read {}:{}", path.to_string_lossy(), idx + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line).with_context(|| {
                format!("failed to decode {}:{}", path.to_string_lossy(), idx + 1)
            })?;
            values.push(value);
        }
        Ok(values)
    }
}
