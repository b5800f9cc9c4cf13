//! Static relation definitions for the project aggregate.
//!
//! The registry is plain data: which relations an entity kind declares,
//! which attributes survive the trip into the destination schema, and how
//! each kind is persisted. It is built once and shared read-only across
//! jobs; nothing here is discovered at runtime.

use std::collections::HashMap;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Settings,
    Label,
    Milestone,
    Board,
    BoardList,
    Badge,
    Snippet,
    Issue,
    LabelLink,
    Note,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Settings => "settings",
            EntityKind::Label => "label",
            EntityKind::Milestone => "milestone",
            EntityKind::Board => "board",
            EntityKind::BoardList => "board_list",
            EntityKind::Badge => "badge",
            EntityKind::Snippet => "snippet",
            EntityKind::Issue => "issue",
            EntityKind::LabelLink => "label_link",
            EntityKind::Note => "note",
        }
    }
}

/// An attribute holding the original id of another exported entity.
/// Remapped through the id translation table, or deferred when the target
/// has not been restored yet.
#[derive(Debug, Clone, Copy)]
pub struct CrossRef {
    pub attr: &'static str,
    pub target: EntityKind,
    /// Mandatory references that never resolve are reported as validation
    /// failures at end of job; optional ones are silently dropped.
    pub mandatory: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ChildRelation {
    /// Key under which the relation appears in the export.
    pub name: &'static str,
    pub kind: EntityKind,
    /// Single-cardinality relations are serialized as one object.
    pub single: bool,
}

/// Where a find-or-create kind looks for an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRule {
    /// The natural key already contains the parent link column.
    Parent,
    /// Scope columns are injected from the destination namespace: the
    /// project itself for personal namespaces, the owning group for group
    /// namespaces (shared entities dedupe across the whole group).
    Namespace,
}

#[derive(Debug, Clone, Copy)]
pub enum BuildMode {
    /// Shared kinds identified by a natural key within a scope.
    FindOrCreate {
        natural_key: &'static [&'static str],
        scope: ScopeRule,
    },
    /// Unique historical records; never deduplicated.
    Create,
}

#[derive(Debug, Clone)]
pub struct RelationDefinition {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Column that receives the persisted parent's id. None for the root
    /// and for kinds whose scope is injected by the build strategy.
    pub parent_attr: Option<&'static str>,
    /// Polymorphic children also record the parent's kind, in the column
    /// derived from `parent_attr` ("noteable_id" -> "noteable_kind").
    pub polymorphic: bool,
    /// Attributes accepted by the destination schema. Anything else in the
    /// export is dropped.
    pub columns: &'static [&'static str],
    /// Attributes stripped before remapping: origin primary key, origin
    /// foreign keys, values the destination regenerates.
    pub denylist: &'static [&'static str],
    /// Attributes that must be present and non-null in the decoded node.
    pub required: &'static [&'static str],
    /// Attributes holding exported user ids, remapped via the member mapper.
    pub user_refs: &'static [&'static str],
    pub cross_refs: &'static [CrossRef],
    /// Export key -> destination column renames, applied before any policy.
    pub renames: &'static [(&'static str, &'static str)],
    pub mode: BuildMode,
    /// Child relations in restoration order.
    pub children: &'static [ChildRelation],
}

pub struct RelationRegistry {
    defs: HashMap<EntityKind, RelationDefinition>,
    root: EntityKind,
}

impl RelationRegistry {
    pub fn new(root: EntityKind, defs: Vec<RelationDefinition>) -> Self {
        let defs = defs.into_iter().map(|d| (d.kind, d)).collect();
        RelationRegistry { defs, root }
    }

    /// The full project-aggregate registry. Order of `children` is the
    /// restoration order; kinds referenced by cross refs come first.
    pub fn standard() -> Self {
        RelationRegistry::new(EntityKind::Project, standard_definitions())
    }

    pub fn root(&self) -> &RelationDefinition {
        &self.defs[&self.root]
    }

    pub fn get(&self, kind: EntityKind) -> Option<&RelationDefinition> {
        self.defs.get(&kind)
    }

    /// Export keys of the root's declared relations, plus the members
    /// relation which is consumed by the member mapper rather than the
    /// tree walk. Readers use this to split root attributes from nested
    /// relation keys.
    pub fn top_level_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.root().children.iter().map(|c| c.name).collect();
        names.push(MEMBERS_RELATION);
        names
    }

    /// Rejects registries a walk could not terminate or persist against:
    /// cycles through child declarations, children without definitions,
    /// remap flags naming attributes the schema does not accept, and
    /// find-or-create kinds with no key to find by.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for def in self.defs.values() {
            for user_ref in def.user_refs {
                if !def.columns.contains(user_ref) {
                    return Err(ConfigError::UnknownRemapColumn {
                        kind: def.kind.as_str(),
                        attr: user_ref,
                    });
                }
            }
            for cross_ref in def.cross_refs {
                if !def.columns.contains(&cross_ref.attr) {
                    return Err(ConfigError::UnknownRemapColumn {
                        kind: def.kind.as_str(),
                        attr: cross_ref.attr,
                    });
                }
            }
            if let BuildMode::FindOrCreate { natural_key, .. } = def.mode {
                if natural_key.is_empty() {
                    return Err(ConfigError::EmptyNaturalKey {
                        kind: def.kind.as_str(),
                    });
                }
            }
        }

        let mut path = Vec::new();
        self.check_cycles(self.root, &mut path)
    }

    fn check_cycles(
        &self,
        kind: EntityKind,
        path: &mut Vec<EntityKind>,
    ) -> Result<(), ConfigError> {
        if path.contains(&kind) {
            let chain = path
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::Cycle {
                kind: kind.as_str(),
                path: chain,
            });
        }
        path.push(kind);
        let def = match self.defs.get(&kind) {
            Some(d) => d,
            None => {
                path.pop();
                return Err(ConfigError::MissingDefinition {
                    relation: "",
                    kind: kind.as_str(),
                });
            }
        };
        for child in def.children {
            if !self.defs.contains_key(&child.kind) {
                path.pop();
                return Err(ConfigError::MissingDefinition {
                    relation: child.name,
                    kind: child.kind.as_str(),
                });
            }
            self.check_cycles(child.kind, path)?;
        }
        path.pop();
        Ok(())
    }
}

/// Relation key holding exported membership records. Not restored as part
/// of the tree; the member mapper consumes it up front.
pub const MEMBERS_RELATION: &str = "members";

fn standard_definitions() -> Vec<RelationDefinition> {
    vec![
        RelationDefinition {
            kind: EntityKind::Project,
            table: "projects",
            parent_attr: None,
            polymorphic: false,
            columns: &["description", "visibility"],
            denylist: &[
                "id",
                "namespace_id",
                "namespace_kind",
                "creator_id",
                "name",
                "path",
                "created_at",
                "updated_at",
            ],
            required: &[],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::Create,
            children: &[
                ChildRelation {
                    name: "settings",
                    kind: EntityKind::Settings,
                    single: true,
                },
                ChildRelation {
                    name: "labels",
                    kind: EntityKind::Label,
                    single: false,
                },
                ChildRelation {
                    name: "milestones",
                    kind: EntityKind::Milestone,
                    single: false,
                },
                ChildRelation {
                    name: "boards",
                    kind: EntityKind::Board,
                    single: false,
                },
                ChildRelation {
                    name: "badges",
                    kind: EntityKind::Badge,
                    single: false,
                },
                ChildRelation {
                    name: "snippets",
                    kind: EntityKind::Snippet,
                    single: false,
                },
                ChildRelation {
                    name: "issues",
                    kind: EntityKind::Issue,
                    single: false,
                },
            ],
        },
        RelationDefinition {
            kind: EntityKind::Settings,
            table: "project_settings",
            parent_attr: Some("project_id"),
            polymorphic: false,
            columns: &[
                "issues_enabled",
                "merge_requests_enabled",
                "wiki_enabled",
                "snippets_enabled",
            ],
            denylist: &["id", "project_id", "created_at", "updated_at"],
            required: &[],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::Create,
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Label,
            table: "labels",
            parent_attr: None,
            polymorphic: false,
            columns: &["title", "color", "description"],
            denylist: &["id", "project_id", "group_id", "created_at", "updated_at"],
            required: &["title"],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::FindOrCreate {
                natural_key: &["title"],
                scope: ScopeRule::Namespace,
            },
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Milestone,
            table: "milestones",
            parent_attr: None,
            polymorphic: false,
            columns: &["title", "description", "due_date", "state"],
            denylist: &[
                "id",
                "iid",
                "project_id",
                "group_id",
                "created_at",
                "updated_at",
            ],
            required: &["title"],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::FindOrCreate {
                natural_key: &["title"],
                scope: ScopeRule::Namespace,
            },
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Board,
            table: "boards",
            parent_attr: Some("project_id"),
            polymorphic: false,
            columns: &["name"],
            denylist: &["id", "project_id", "group_id", "created_at", "updated_at"],
            required: &["name"],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::FindOrCreate {
                natural_key: &["project_id", "name"],
                scope: ScopeRule::Parent,
            },
            children: &[ChildRelation {
                name: "lists",
                kind: EntityKind::BoardList,
                single: false,
            }],
        },
        RelationDefinition {
            kind: EntityKind::BoardList,
            table: "board_lists",
            parent_attr: Some("board_id"),
            polymorphic: false,
            columns: &["label_id", "position"],
            denylist: &["id", "board_id", "created_at", "updated_at"],
            required: &[],
            user_refs: &[],
            cross_refs: &[CrossRef {
                attr: "label_id",
                target: EntityKind::Label,
                mandatory: true,
            }],
            renames: &[],
            mode: BuildMode::Create,
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Badge,
            table: "badges",
            parent_attr: Some("project_id"),
            polymorphic: false,
            columns: &["link_url", "image_url"],
            denylist: &["id", "project_id", "created_at", "updated_at"],
            required: &["link_url"],
            user_refs: &[],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::Create,
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Snippet,
            table: "snippets",
            parent_attr: Some("project_id"),
            polymorphic: false,
            columns: &[
                "title",
                "file_name",
                "content",
                "visibility",
                "author_id",
                "created_at",
                "updated_at",
            ],
            denylist: &["id", "project_id", "created_at", "updated_at"],
            required: &["title"],
            user_refs: &["author_id"],
            cross_refs: &[],
            renames: &[],
            mode: BuildMode::Create,
            children: &[ChildRelation {
                name: "notes",
                kind: EntityKind::Note,
                single: false,
            }],
        },
        RelationDefinition {
            kind: EntityKind::Issue,
            table: "issues",
            parent_attr: Some("project_id"),
            polymorphic: false,
            columns: &[
                "iid",
                "title",
                "description",
                "state",
                "author_id",
                "assignee_id",
                "milestone_id",
                "moved_to_id",
                "created_at",
                "updated_at",
            ],
            denylist: &["id", "project_id", "created_at", "updated_at"],
            required: &["title"],
            user_refs: &["author_id", "assignee_id"],
            cross_refs: &[
                CrossRef {
                    attr: "milestone_id",
                    target: EntityKind::Milestone,
                    mandatory: false,
                },
                CrossRef {
                    attr: "moved_to_id",
                    target: EntityKind::Issue,
                    mandatory: false,
                },
            ],
            renames: &[],
            mode: BuildMode::Create,
            children: &[
                ChildRelation {
                    name: "notes",
                    kind: EntityKind::Note,
                    single: false,
                },
                ChildRelation {
                    name: "label_links",
                    kind: EntityKind::LabelLink,
                    single: false,
                },
            ],
        },
        RelationDefinition {
            kind: EntityKind::LabelLink,
            table: "label_links",
            parent_attr: Some("target_id"),
            polymorphic: true,
            columns: &["label_id"],
            denylist: &["id", "target_id", "target_kind", "created_at", "updated_at"],
            required: &[],
            user_refs: &[],
            cross_refs: &[CrossRef {
                attr: "label_id",
                target: EntityKind::Label,
                mandatory: true,
            }],
            renames: &[],
            mode: BuildMode::Create,
            children: &[],
        },
        RelationDefinition {
            kind: EntityKind::Note,
            table: "notes",
            parent_attr: Some("noteable_id"),
            polymorphic: true,
            columns: &["body", "author_id", "created_at"],
            denylist: &[
                "id",
                "noteable_id",
                "noteable_kind",
                "project_id",
                "created_at",
                "updated_at",
            ],
            required: &["body"],
            user_refs: &["author_id"],
            cross_refs: &[],
            // Origin serializes the text under "note".
            renames: &[("note", "body")],
            mode: BuildMode::Create,
            children: &[],
        },
    ]
}
