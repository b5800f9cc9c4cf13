//! Relation tree restorer.
//!
//! One job is one sequential depth-first walk: reader -> factory ->
//! builder per node, children in declared order, source order within a
//! collection. A failed node skips its own subtree and nothing else; every
//! failure below the root becomes a recorded issue instead of an error.
//! The walk holds no global state and takes no suspension points.

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use crate::builder::{self, to_sql_value, BuildOutcome};
use crate::context::{DeferredPatch, ImportContext, IssueKind};
use crate::factory::{self, ParentLink};
use crate::members::{ExportedMember, MemberMapper};
use crate::node::RelationNode;
use crate::reader::RelationReader;
use crate::registry::{
    ChildRelation, EntityKind, RelationDefinition, RelationRegistry, MEMBERS_RELATION,
};

pub struct RelationTreeRestorer<'a, R: RelationReader> {
    conn: &'a Connection,
    registry: &'a RelationRegistry,
    reader: R,
    ctx: &'a mut ImportContext,
}

impl<'a, R: RelationReader> RelationTreeRestorer<'a, R> {
    pub fn new(
        conn: &'a Connection,
        registry: &'a RelationRegistry,
        reader: R,
        ctx: &'a mut ImportContext,
    ) -> Self {
        RelationTreeRestorer {
            conn,
            registry,
            reader,
            ctx,
        }
    }

    /// Restores the tree into the destination root. Returns true iff the
    /// root entity itself persisted; skipped descendant branches do not
    /// change the outcome and are available as recorded issues.
    pub fn restore(&mut self) -> bool {
        if let Err(err) = self.registry.validate() {
            self.ctx.record(
                IssueKind::Config,
                EntityKind::Project,
                "project",
                err.to_string(),
            );
            return false;
        }

        debug!(project = %self.ctx.project_id, "starting relation tree restore");

        let exported_members = match self.reader.consume_relation(MEMBERS_RELATION) {
            Ok(values) => ExportedMember::from_values(&values),
            Err(err) => {
                self.ctx.record(
                    IssueKind::Schema,
                    EntityKind::Project,
                    "project/members",
                    err.to_string(),
                );
                Vec::new()
            }
        };
        let mut members = MemberMapper::new(
            self.conn,
            &self.ctx.project_id,
            &self.ctx.importer_id,
            exported_members,
        );

        if !self.restore_root(&mut members) {
            return false;
        }

        let registry = self.registry;
        let root = registry.root();
        for child in root.children {
            let values = match self.reader.consume_relation(child.name) {
                Ok(values) => values,
                Err(err) => {
                    self.ctx.record(
                        IssueKind::Schema,
                        child.kind,
                        &format!("project/{}", child.name),
                        err.to_string(),
                    );
                    continue;
                }
            };
            let parent = ParentLink {
                kind: EntityKind::Project,
                id: self.ctx.project_id.clone(),
            };
            self.walk_relation(&mut members, "project", &parent, child, values);
        }

        self.apply_remaining_patches();
        debug!(
            project = %self.ctx.project_id,
            translated = self.ctx.ids.len(),
            issues = self.ctx.issues().len(),
            "relation tree restore finished"
        );
        true
    }

    /// The destination root row already exists; restoring the root means
    /// updating its portable attributes.
    fn restore_root(&mut self, members: &mut MemberMapper<'a>) -> bool {
        let attrs = match self.reader.root_attributes() {
            Ok(attrs) => attrs,
            Err(err) => {
                self.ctx.record(
                    IssueKind::Schema,
                    EntityKind::Project,
                    "project",
                    err.to_string(),
                );
                return false;
            }
        };

        let registry = self.registry;
        let root = registry.root();
        let candidate = match factory::build(root, &attrs, None, members, self.ctx, "project") {
            Ok(candidate) => candidate,
            Err(err) => {
                self.ctx
                    .record(IssueKind::Schema, EntityKind::Project, "project", err.0);
                return false;
            }
        };

        let mut assignments = vec!["updated_at = ?1".to_string()];
        let mut params: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(
            chrono::Utc::now().to_rfc3339(),
        )];
        for (column, value) in &candidate.attributes {
            assignments.push(format!("{} = ?{}", column, params.len() + 1));
            params.push(to_sql_value(value));
        }
        let sql = format!(
            "UPDATE projects SET {} WHERE id = ?{}",
            assignments.join(", "),
            params.len() + 1
        );
        params.push(rusqlite::types::Value::Text(self.ctx.project_id.clone()));

        let updated = match self.conn.execute(&sql, rusqlite::params_from_iter(params)) {
            Ok(count) => count,
            Err(err) => {
                self.ctx.record(
                    IssueKind::Validation,
                    EntityKind::Project,
                    "project",
                    err.to_string(),
                );
                return false;
            }
        };
        if updated == 0 {
            self.ctx.record(
                IssueKind::Validation,
                EntityKind::Project,
                "project",
                "destination project does not exist".to_string(),
            );
            return false;
        }

        if let Some(original) = candidate.original_id {
            self.ctx
                .ids
                .record(EntityKind::Project, original, self.ctx.project_id.clone());
        }
        true
    }

    fn walk_relation(
        &mut self,
        members: &mut MemberMapper<'a>,
        parent_path: &str,
        parent: &ParentLink,
        relation: &ChildRelation,
        values: Vec<Value>,
    ) {
        let registry = self.registry;
        let def = match registry.get(relation.kind) {
            Some(def) => def,
            None => {
                // validate() rejects registries with missing kinds; this
                // only fires for callers walking an unvalidated registry.
                self.ctx.record(
                    IssueKind::Config,
                    relation.kind,
                    parent_path,
                    format!("no definition for kind '{}'", relation.kind.as_str()),
                );
                return;
            }
        };

        let limit = if relation.single { 1 } else { values.len() };
        for (idx, value) in values.into_iter().take(limit).enumerate() {
            let path = format!("{}/{}[{}]", parent_path, relation.name, idx);
            self.restore_node(members, &path, parent, def, value);
        }
    }

    fn restore_node(
        &mut self,
        members: &mut MemberMapper<'a>,
        path: &str,
        parent: &ParentLink,
        def: &'a RelationDefinition,
        value: Value,
    ) {
        let node = match RelationNode::from_value(def, value) {
            Ok(node) => node,
            Err(err) => {
                warn!(path, kind = def.kind.as_str(), "skipping malformed node");
                self.ctx.record(IssueKind::Schema, def.kind, path, err.0);
                return;
            }
        };

        let candidate = match factory::build(
            def,
            &node.attributes,
            Some(parent),
            members,
            self.ctx,
            path,
        ) {
            Ok(candidate) => candidate,
            Err(err) => {
                warn!(path, kind = def.kind.as_str(), "skipping node with schema error");
                self.ctx.record(IssueKind::Schema, def.kind, path, err.0);
                return;
            }
        };

        let strategy = builder::strategy_for(def, self.ctx);
        let outcome = match strategy.persist(self.conn, def, &candidate) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path, kind = def.kind.as_str(), "persistence rejected node");
                self.ctx.record(IssueKind::Validation, def.kind, path, err.0);
                return;
            }
        };
        let destination_id = outcome.id().to_string();
        if let BuildOutcome::Created(_) = outcome {
            debug!(path, kind = def.kind.as_str(), id = %destination_id, "persisted");
        }

        for pending in &candidate.pending {
            self.ctx.defer(DeferredPatch {
                awaiting: pending.target,
                table: def.table,
                column: pending.column,
                row_id: destination_id.clone(),
                mandatory: pending.mandatory,
                entity: def.kind,
                path: path.to_string(),
            });
        }

        if let Some(original) = candidate.original_id {
            self.ctx
                .ids
                .record(def.kind, original, destination_id.clone());
            self.flush_patches_for(def.kind, original);
        }

        for child in def.children {
            let child_values = node.child_values(child.name).to_vec();
            if child_values.is_empty() {
                continue;
            }
            let parent = ParentLink {
                kind: def.kind,
                id: destination_id.clone(),
            };
            self.walk_relation(members, path, &parent, child, child_values);
        }
    }

    /// Applies the patches waiting on an entity that just got a
    /// translation entry.
    fn flush_patches_for(&mut self, kind: EntityKind, original: i64) {
        let ready = self.ctx.take_patches_for(kind, original);
        for patch in ready {
            self.apply_patch(&patch);
        }
    }

    /// End-of-job fixed point: retry deferred patches until a pass applies
    /// nothing, then report the leftovers. Mandatory references that never
    /// resolved are validation failures; optional ones are dropped.
    fn apply_remaining_patches(&mut self) {
        let mut pending = self.ctx.take_all_patches();
        loop {
            let mut progressed = false;
            let mut rest = Vec::with_capacity(pending.len());
            for patch in pending {
                let resolved = self
                    .ctx
                    .ids
                    .lookup(patch.awaiting.0, patch.awaiting.1)
                    .is_some();
                if resolved {
                    self.apply_patch(&patch);
                    progressed = true;
                } else {
                    rest.push(patch);
                }
            }
            pending = rest;
            if !progressed || pending.is_empty() {
                break;
            }
        }

        for leftover in pending {
            let message = format!(
                "reference to {} {} never appeared; '{}' left unset",
                leftover.awaiting.0.as_str(),
                leftover.awaiting.1,
                leftover.column
            );
            let kind = if leftover.mandatory {
                IssueKind::Validation
            } else {
                IssueKind::UnresolvedReference
            };
            self.ctx
                .record(kind, leftover.entity, &leftover.path, message);
        }
    }

    fn apply_patch(&mut self, patch: &DeferredPatch) {
        let destination = match self.ctx.ids.lookup(patch.awaiting.0, patch.awaiting.1) {
            Some(id) => id.to_string(),
            None => return,
        };
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE id = ?2",
            patch.table, patch.column
        );
        if let Err(err) = self.conn.execute(&sql, (&destination, &patch.row_id)) {
            self.ctx.record(
                IssueKind::Validation,
                patch.entity,
                &patch.path,
                format!("deferred patch of '{}' failed: {}", patch.column, err),
            );
        }
    }
}
