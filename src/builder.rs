//! Object builder: turns candidates into persisted rows.
//!
//! Persistence is polymorphic over (entity kind, namespace variant). A
//! strategy either finds an existing row by natural key and reuses it, or
//! always creates a fresh one. Engine-level rejections come back as
//! validation errors; the restorer converts them into recorded issues and
//! skips the subtree, so nothing here raises past the orchestrator.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{ImportContext, NamespaceVariant};
use crate::error::ValidationError;
use crate::factory::Candidate;
use crate::registry::{BuildMode, RelationDefinition, ScopeRule};

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Created(String),
    Reused(String),
}

impl BuildOutcome {
    pub fn id(&self) -> &str {
        match self {
            BuildOutcome::Created(id) | BuildOutcome::Reused(id) => id,
        }
    }
}

pub trait PersistStrategy {
    fn persist(
        &self,
        conn: &Connection,
        def: &RelationDefinition,
        candidate: &Candidate,
    ) -> Result<BuildOutcome, ValidationError>;
}

/// Picks the strategy for a kind in the current destination context.
/// Namespace-scoped shared kinds dedupe against the project itself for
/// personal targets and against the owning group for group targets.
pub fn strategy_for(
    def: &RelationDefinition,
    ctx: &ImportContext,
) -> Box<dyn PersistStrategy> {
    match def.mode {
        BuildMode::Create => Box::new(PureCreate),
        BuildMode::FindOrCreate {
            natural_key,
            scope: ScopeRule::Parent,
        } => Box::new(FindOrCreate {
            natural_key,
            scope: None,
        }),
        BuildMode::FindOrCreate {
            natural_key,
            scope: ScopeRule::Namespace,
        } => {
            let scope = match &ctx.namespace {
                NamespaceVariant::Personal => ("project", ctx.project_id.clone()),
                NamespaceVariant::Group { group_id } => ("group", group_id.clone()),
            };
            Box::new(FindOrCreate {
                natural_key,
                scope: Some(scope),
            })
        }
    }
}

/// Shared kinds: look up by natural key within scope, reuse when present.
struct FindOrCreate {
    natural_key: &'static [&'static str],
    scope: Option<(&'static str, String)>,
}

/// Unique historical records: always a fresh row, never deduplicated.
struct PureCreate;

impl PersistStrategy for FindOrCreate {
    fn persist(
        &self,
        conn: &Connection,
        def: &RelationDefinition,
        candidate: &Candidate,
    ) -> Result<BuildOutcome, ValidationError> {
        let mut attributes = candidate.attributes.clone();
        if let Some((scope_kind, scope_id)) = &self.scope {
            attributes.insert(
                "scope_kind".to_string(),
                Value::String((*scope_kind).to_string()),
            );
            attributes.insert("scope_id".to_string(), Value::String(scope_id.clone()));
        }

        let mut key_columns: Vec<&str> = Vec::new();
        if self.scope.is_some() {
            key_columns.push("scope_kind");
            key_columns.push("scope_id");
        }
        key_columns.extend(self.natural_key.iter().copied());

        let mut clauses = Vec::with_capacity(key_columns.len());
        let mut params: Vec<SqlValue> = Vec::with_capacity(key_columns.len());
        for column in &key_columns {
            let value = attributes.get(*column).ok_or_else(|| {
                ValidationError(format!("natural key attribute '{}' is absent", column))
            })?;
            clauses.push(format!("{} = ?{}", column, params.len() + 1));
            params.push(to_sql_value(value));
        }

        let sql = format!(
            "SELECT id FROM {} WHERE {}",
            def.table,
            clauses.join(" AND ")
        );
        let existing: Option<String> = conn
            .query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(ValidationError(other.to_string())),
            })?;

        if let Some(id) = existing {
            tracing::debug!(kind = def.kind.as_str(), id = %id, "reusing existing entity");
            return Ok(BuildOutcome::Reused(id));
        }

        let id = insert_row(conn, def.table, &attributes)?;
        Ok(BuildOutcome::Created(id))
    }
}

impl PersistStrategy for PureCreate {
    fn persist(
        &self,
        conn: &Connection,
        def: &RelationDefinition,
        candidate: &Candidate,
    ) -> Result<BuildOutcome, ValidationError> {
        let id = insert_row(conn, def.table, &candidate.attributes)?;
        Ok(BuildOutcome::Created(id))
    }
}

fn insert_row(
    conn: &Connection,
    table: &str,
    attributes: &serde_json::Map<String, Value>,
) -> Result<String, ValidationError> {
    let id = Uuid::new_v4().to_string();

    let mut columns = vec!["id".to_string()];
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(id.clone())];
    for (column, value) in attributes {
        columns.push(column.clone());
        params.push(to_sql_value(value));
    }

    let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, rusqlite::params_from_iter(params))
        .map_err(|e| ValidationError(e.to_string()))?;
    Ok(id)
}

/// JSON attribute values at the SQL boundary. Structured values are stored
/// as their JSON text, matching how the destination schema treats opaque
/// payload columns.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
