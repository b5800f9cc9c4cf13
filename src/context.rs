//! Job-scoped import state.
//!
//! One context per import job. It owns the recorded issue list, the id
//! translation table, and the deferred-patch queue; the restorer threads a
//! mutable reference through the whole walk instead of keeping any global
//! state. Contexts are never shared across jobs.

use std::collections::HashMap;

use crate::registry::EntityKind;

/// Destination namespace shape of the import target. Shared kinds
/// (labels, milestones) dedupe at project scope for personal namespaces
/// and at group scope for group namespaces.
#[derive(Debug, Clone)]
pub enum NamespaceVariant {
    Personal,
    Group { group_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Node shape did not match its relation definition.
    Schema,
    /// The persistence engine rejected the constructed entity.
    Validation,
    /// A cross-reference target never appeared in the job.
    UnresolvedReference,
    /// An exported user could not be matched; the importer was substituted.
    MemberFallback,
    /// The registry itself is inconsistent; nothing was persisted.
    Config,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Schema => "schema",
            IssueKind::Validation => "validation",
            IssueKind::UnresolvedReference => "unresolved_reference",
            IssueKind::MemberFallback => "member_fallback",
            IssueKind::Config => "config",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportIssue {
    pub kind: IssueKind,
    /// Relation path of the node, e.g. "project/issues[2]/notes[0]".
    pub path: String,
    pub entity: EntityKind,
    pub message: String,
}

/// Per-job mapping from (entity kind, original id) to destination id.
/// Entries are written once and never overwritten.
#[derive(Debug, Default)]
pub struct IdTranslationTable {
    map: HashMap<(EntityKind, i64), String>,
}

impl IdTranslationTable {
    pub fn record(&mut self, kind: EntityKind, original: i64, destination: String) {
        self.map.entry((kind, original)).or_insert(destination);
    }

    pub fn lookup(&self, kind: EntityKind, original: i64) -> Option<&str> {
        self.map.get(&(kind, original)).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A queued cross-reference fix-up: once the awaited entity is persisted,
/// `column` on the already-persisted referencing row is patched to the
/// destination id.
#[derive(Debug, Clone)]
pub struct DeferredPatch {
    pub awaiting: (EntityKind, i64),
    pub table: &'static str,
    pub column: &'static str,
    pub row_id: String,
    pub mandatory: bool,
    pub entity: EntityKind,
    pub path: String,
}

pub struct ImportContext {
    pub project_id: String,
    pub importer_id: String,
    pub namespace: NamespaceVariant,
    issues: Vec<ImportIssue>,
    pub ids: IdTranslationTable,
    deferred: Vec<DeferredPatch>,
}

impl ImportContext {
    pub fn new(project_id: String, importer_id: String, namespace: NamespaceVariant) -> Self {
        ImportContext {
            project_id,
            importer_id,
            namespace,
            issues: Vec::new(),
            ids: IdTranslationTable::default(),
            deferred: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: IssueKind, entity: EntityKind, path: &str, message: String) {
        self.issues.push(ImportIssue {
            kind,
            path: path.to_string(),
            entity,
            message,
        });
    }

    /// Recorded issues in the order they occurred.
    pub fn issues(&self) -> &[ImportIssue] {
        &self.issues
    }

    pub fn defer(&mut self, patch: DeferredPatch) {
        self.deferred.push(patch);
    }

    /// Removes and returns the patches waiting on an entity that just
    /// gained a translation entry.
    pub fn take_patches_for(&mut self, kind: EntityKind, original: i64) -> Vec<DeferredPatch> {
        let mut ready = Vec::new();
        let mut rest = Vec::with_capacity(self.deferred.len());
        for patch in self.deferred.drain(..) {
            if patch.awaiting == (kind, original) {
                ready.push(patch);
            } else {
                rest.push(patch);
            }
        }
        self.deferred = rest;
        ready
    }

    pub fn take_all_patches(&mut self) -> Vec<DeferredPatch> {
        std::mem::take(&mut self.deferred)
    }

    pub fn pending_patches(&self) -> usize {
        self.deferred.len()
    }
}
