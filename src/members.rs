//! Member mapping.
//!
//! Exported author/assignee/owner references carry the origin system's
//! user ids. Those ids mean nothing in the destination; the mapper bridges
//! them to users who are members of the import target, falling back to the
//! importing user when no match exists. Resolution never fails the import.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;

use crate::context::{ImportContext, IssueKind};
use crate::registry::EntityKind;

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// One record from the export's members relation.
#[derive(Debug, Clone)]
pub struct ExportedMember {
    pub user_id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl ExportedMember {
    /// Accepts the exported membership shape: user_id at the top level,
    /// username/email nested under "user". Records without a usable
    /// user_id are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw: RawMember = serde_json::from_value(value.clone()).ok()?;
        let user = raw.user.unwrap_or_default();
        let user_id = raw.user_id.or(user.id)?;
        Some(ExportedMember {
            user_id,
            username: user.username,
            email: user.email,
        })
    }

    pub fn from_values(values: &[Value]) -> Vec<Self> {
        values.iter().filter_map(Self::from_value).collect()
    }
}

pub struct MemberMapper<'a> {
    conn: &'a Connection,
    project_id: String,
    importer_id: String,
    exported: HashMap<i64, ExportedMember>,
    memo: HashMap<i64, String>,
}

impl<'a> MemberMapper<'a> {
    pub fn new(
        conn: &'a Connection,
        project_id: &str,
        importer_id: &str,
        exported: Vec<ExportedMember>,
    ) -> Self {
        let exported = exported.into_iter().map(|m| (m.user_id, m)).collect();
        MemberMapper {
            conn,
            project_id: project_id.to_string(),
            importer_id: importer_id.to_string(),
            exported,
            memo: HashMap::new(),
        }
    }

    /// Maps an original user id to a destination user id. The first call
    /// for an id computes and memoizes; later calls return the cached
    /// value. A fallback to the importer records a soft warning once per
    /// original id.
    pub fn resolve(
        &mut self,
        ctx: &mut ImportContext,
        entity: EntityKind,
        path: &str,
        original: i64,
    ) -> String {
        if let Some(found) = self.memo.get(&original) {
            return found.clone();
        }

        let matched = self
            .exported
            .get(&original)
            .and_then(|member| self.find_destination_member(member));

        let resolved = match matched {
            Some(id) => id,
            None => {
                ctx.record(
                    IssueKind::MemberFallback,
                    entity,
                    path,
                    format!(
                        "exported user {} has no member match; assigned to importer",
                        original
                    ),
                );
                self.importer_id.clone()
            }
        };
        self.memo.insert(original, resolved.clone());
        resolved
    }

    /// A destination user counts as a match only when they are a member of
    /// the import target; a username or email collision with a stranger is
    /// not an identity.
    fn find_destination_member(&self, member: &ExportedMember) -> Option<String> {
        let username = member.username.as_deref().unwrap_or("");
        let email = member.email.as_deref().unwrap_or("");
        if username.is_empty() && email.is_empty() {
            return None;
        }
        self.conn
            .query_row(
                "SELECT u.id
                 FROM users u
                 JOIN project_members m ON m.user_id = u.id
                 WHERE m.project_id = ?1 AND (u.username = ?2 OR u.email = ?3)",
                (&self.project_id, username, email),
                |row| row.get::<_, String>(0),
            )
            .optional()
            .ok()
            .flatten()
    }
}
