
use serde_json::json;
use test_support::{count, open_store, personal_ctx, restore_value, seed_project};
use treerestore::context::IssueKind;
use treerestore::registry::EntityKind;

#[test]
fn failing_branch_does_not_abort_siblings() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "partial");

    let export = json!({
        "id": 1,
        "description": "partial import",
        "labels": [
            {"id": 11, "title": "bug"},
            {"id": 12, "color": "#fff"},
            {"id": 13, "title": "feature"}
        ],
        "badges": [
            {"id": 51, "image_url": "https://img.example.com/only.svg"},
            {"id": 52, "link_url": "https://ci.example.com"}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));

    // The malformed label and badge are skipped; their siblings survive.
    assert_eq!(count(&conn, "labels"), 2);
    assert_eq!(count(&conn, "badges"), 1);

    let schema_issues: Vec<_> = ctx
        .issues()
        .iter()
        .filter(|i| i.kind == IssueKind::Schema)
        .collect();
    assert_eq!(schema_issues.len(), 2);
    assert_eq!(schema_issues[0].path, "project/labels[1]");
    assert_eq!(schema_issues[0].entity, EntityKind::Label);
    assert_eq!(schema_issues[1].path, "project/badges[0]");
}

#[test]
fn failed_node_skips_its_whole_subtree() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "subtree");

    // The snippet has no title, so neither it nor its note may appear;
    // the issue next to it restores normally.
    let export = json!({
        "id": 1,
        "snippets": [
            {
                "id": 61,
                "file_name": "broken.sh",
                "notes": [{"id": 71, "note": "orphaned", "author_id": 101}]
            }
        ],
        "issues": [
            {
                "id": 81,
                "iid": 1,
                "title": "Still restored",
                "notes": [{"id": 72, "note": "kept"}]
            }
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));

    assert_eq!(count(&conn, "snippets"), 0);
    assert_eq!(count(&conn, "issues"), 1);
    assert_eq!(count(&conn, "notes"), 1);

    let kept_kind: String = conn
        .query_row("SELECT noteable_kind FROM notes", [], |row| row.get(0))
        .expect("surviving note");
    assert_eq!(kept_kind, "issue");
}

#[test]
fn wrong_reference_shape_is_a_schema_error() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "ref-shape");

    let export = json!({
        "id": 1,
        "issues": [
            {"id": 81, "iid": 1, "title": "Bad author", "author_id": "alice"},
            {"id": 82, "iid": 2, "title": "Good sibling"}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));

    assert_eq!(count(&conn, "issues"), 1);
    let issue = &ctx.issues()[0];
    assert_eq!(issue.kind, IssueKind::Schema);
    assert_eq!(issue.path, "project/issues[0]");
    assert!(issue.message.contains("author_id"));
}

#[test]
fn nonexistent_destination_root_fails_the_restore() {
    let conn = open_store();
    let (_, importer_id) = seed_project(&conn, "gone");

    let mut ctx = personal_ctx("no-such-project", &importer_id);
    let export = json!({"id": 1, "description": "d", "labels": [{"id": 11, "title": "bug"}]});
    assert!(!restore_value(&conn, &mut ctx, export));

    assert_eq!(ctx.issues().len(), 1);
    assert_eq!(ctx.issues()[0].kind, IssueKind::Validation);
    // Nothing below a failed root is restored.
    assert_eq!(count(&conn, "labels"), 0);
}
