//! Destination store bootstrap.
//!
//! The import target is a SQLite workspace. Schema creation is idempotent
//! so opening an existing workspace is safe. The import itself only ever
//! adds rows; users are assumed to exist already and are never created by
//! a restore job.

use std::path::Path;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

pub fn open_store(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("treerestore.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// In-memory store with the same schema; used by tests and callers that
/// stage an import before committing to a workspace.
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS projects(
            id TEXT PRIMARY KEY,
            namespace_kind TEXT NOT NULL,
            namespace_id TEXT,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            description TEXT,
            visibility TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            name TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS project_members(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            access_level INTEGER NOT NULL,
            UNIQUE(project_id, user_id),
            FOREIGN KEY(project_id) REFERENCES projects(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_project_members_project ON project_members(project_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS project_settings(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            issues_enabled INTEGER,
            merge_requests_enabled INTEGER,
            wiki_enabled INTEGER,
            snippets_enabled INTEGER,
            UNIQUE(project_id),
            FOREIGN KEY(project_id) REFERENCES projects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS labels(
            id TEXT PRIMARY KEY,
            scope_kind TEXT NOT NULL,
            scope_id TEXT NOT NULL,
            title TEXT NOT NULL,
            color TEXT,
            description TEXT,
            UNIQUE(scope_kind, scope_id, title)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_labels_scope ON labels(scope_kind, scope_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS milestones(
            id TEXT PRIMARY KEY,
            scope_kind TEXT NOT NULL,
            scope_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            due_date TEXT,
            state TEXT,
            UNIQUE(scope_kind, scope_id, title)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_milestones_scope ON milestones(scope_kind, scope_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS boards(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(project_id, name),
            FOREIGN KEY(project_id) REFERENCES projects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS board_lists(
            id TEXT PRIMARY KEY,
            board_id TEXT NOT NULL,
            label_id TEXT,
            position INTEGER,
            FOREIGN KEY(board_id) REFERENCES boards(id),
            FOREIGN KEY(label_id) REFERENCES labels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_board_lists_board ON board_lists(board_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS badges(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            link_url TEXT NOT NULL,
            image_url TEXT,
            FOREIGN KEY(project_id) REFERENCES projects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_badges_project ON badges(project_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snippets(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL,
            file_name TEXT,
            content TEXT,
            visibility TEXT,
            author_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(project_id) REFERENCES projects(id),
            FOREIGN KEY(author_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snippets_project ON snippets(project_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS issues(
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            iid INTEGER,
            title TEXT NOT NULL,
            description TEXT,
            state TEXT,
            author_id TEXT,
            assignee_id TEXT,
            milestone_id TEXT,
            moved_to_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(project_id) REFERENCES projects(id),
            FOREIGN KEY(author_id) REFERENCES users(id),
            FOREIGN KEY(assignee_id) REFERENCES users(id),
            FOREIGN KEY(milestone_id) REFERENCES milestones(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_issues_milestone ON issues(milestone_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS label_links(
            id TEXT PRIMARY KEY,
            label_id TEXT,
            target_kind TEXT NOT NULL,
            target_id TEXT NOT NULL,
            FOREIGN KEY(label_id) REFERENCES labels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_label_links_target ON label_links(target_kind, target_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notes(
            id TEXT PRIMARY KEY,
            noteable_kind TEXT NOT NULL,
            noteable_id TEXT NOT NULL,
            author_id TEXT,
            body TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(author_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notes_noteable ON notes(noteable_kind, noteable_id)",
        [],
    )?;

    Ok(())
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    name: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, email, name) VALUES(?, ?, ?, ?)",
        (&id, username, email, name),
    )?;
    Ok(id)
}

pub fn create_project(
    conn: &Connection,
    name: &str,
    path: &str,
    namespace_kind: &str,
    namespace_id: Option<&str>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO projects(id, namespace_kind, namespace_id, name, path, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, namespace_kind, namespace_id, name, path, &now, &now),
    )?;
    Ok(id)
}

pub fn add_member(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    access_level: i64,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO project_members(id, project_id, user_id, access_level) VALUES(?, ?, ?, ?)",
        (&id, project_id, user_id, access_level),
    )?;
    Ok(id)
}
