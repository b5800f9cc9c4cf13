//! Relation factory: one decoded node in, one persistable candidate out.
//!
//! The factory owns every attribute-level transformation: denylist strip,
//! declared renames, user-reference remapping, internal cross-reference
//! remapping (or deferral), parent-link attachment, and the allow policy
//! for the destination schema. It never persists anything.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::context::ImportContext;
use crate::error::SchemaError;
use crate::members::MemberMapper;
use crate::node::json_kind;
use crate::registry::{EntityKind, RelationDefinition};

/// Already-persisted parent of the node being built.
#[derive(Debug, Clone)]
pub struct ParentLink {
    pub kind: EntityKind,
    pub id: String,
}

/// A cross-reference whose target has not been restored yet. The builder
/// persists the row with the column absent; the restorer patches it once
/// the target appears.
#[derive(Debug, Clone)]
pub struct PendingRef {
    pub column: &'static str,
    pub target: (EntityKind, i64),
    pub mandatory: bool,
}

/// Candidate entity: remapped attributes ready for construction.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: EntityKind,
    pub original_id: Option<i64>,
    pub attributes: Map<String, Value>,
    pub pending: Vec<PendingRef>,
}

pub fn build(
    def: &RelationDefinition,
    raw: &Map<String, Value>,
    parent: Option<&ParentLink>,
    members: &mut MemberMapper<'_>,
    ctx: &mut ImportContext,
    path: &str,
) -> Result<Candidate, SchemaError> {
    let original_id = raw.get("id").and_then(|v| v.as_i64());

    let mut working = raw.clone();
    for (from, to) in def.renames {
        if let Some(value) = working.remove(*from) {
            working.insert((*to).to_string(), value);
        }
    }

    for required in def.required {
        match working.get(*required) {
            None | Some(Value::Null) => {
                return Err(SchemaError(format!(
                    "required attribute '{}' is missing",
                    required
                )))
            }
            Some(_) => {}
        }
    }

    // Remap-eligible attributes must carry original numeric ids.
    for attr in def.user_refs {
        check_ref_shape(&working, attr)?;
    }
    for cross_ref in def.cross_refs {
        check_ref_shape(&working, cross_ref.attr)?;
    }

    let mut attributes = Map::new();
    let mut pending = Vec::new();

    for (key, value) in working {
        if def.denylist.iter().any(|d| *d == key) {
            continue;
        }
        if !def.columns.iter().any(|c| *c == key) {
            continue;
        }

        if def.user_refs.iter().any(|u| *u == key) {
            let remapped = match value.as_i64() {
                Some(original) => {
                    Value::String(members.resolve(ctx, def.kind, path, original))
                }
                None => Value::Null,
            };
            attributes.insert(key, remapped);
            continue;
        }

        if let Some(cross_ref) = def.cross_refs.iter().find(|c| c.attr == key) {
            match value.as_i64() {
                Some(original) => match ctx.ids.lookup(cross_ref.target, original) {
                    Some(destination) => {
                        attributes.insert(key, Value::String(destination.to_string()));
                    }
                    None => {
                        // Forward reference: persist without it, patch later.
                        attributes.insert(key, Value::Null);
                        pending.push(PendingRef {
                            column: cross_ref.attr,
                            target: (cross_ref.target, original),
                            mandatory: cross_ref.mandatory,
                        });
                    }
                },
                None => {
                    attributes.insert(key, Value::Null);
                }
            }
            continue;
        }

        attributes.insert(key, value);
    }

    // Exported timestamps are denylisted; the destination gets fresh ones.
    let now = Utc::now().to_rfc3339();
    for stamp in ["created_at", "updated_at"] {
        if def.columns.contains(&stamp) {
            attributes.insert(stamp.to_string(), Value::String(now.clone()));
        }
    }

    if let Some(parent) = parent {
        if let Some(parent_attr) = def.parent_attr {
            attributes.insert(parent_attr.to_string(), Value::String(parent.id.clone()));
            if def.polymorphic {
                let kind_column = polymorphic_kind_column(parent_attr);
                attributes.insert(kind_column, Value::String(parent.kind.as_str().to_string()));
            }
        }
    }

    Ok(Candidate {
        kind: def.kind,
        original_id,
        attributes,
        pending,
    })
}

fn check_ref_shape(attrs: &Map<String, Value>, attr: &str) -> Result<(), SchemaError> {
    match attrs.get(attr) {
        None | Some(Value::Null) => Ok(()),
        Some(value) if value.as_i64().is_some() => Ok(()),
        Some(other) => Err(SchemaError(format!(
            "reference attribute '{}' is {}, expected an original id",
            attr,
            json_kind(other)
        ))),
    }
}

/// "noteable_id" -> "noteable_kind", "target_id" -> "target_kind".
fn polymorphic_kind_column(parent_attr: &str) -> String {
    format!("{}_kind", parent_attr.trim_end_matches("_id"))
}
