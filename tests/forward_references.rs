
use serde_json::json;
use test_support::{count, open_store, personal_ctx, restore_value, seed_project};
use treerestore::context::IssueKind;

fn issue_id_by_iid(conn: &rusqlite::Connection, iid: i64) -> String {
    conn.query_row("SELECT id FROM issues WHERE iid = ?", [iid], |row| {
        row.get(0)
    })
    .expect("issue by iid")
}

#[test]
fn forward_reference_is_patched_once_target_appears() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "forward");

    // Issue 81 points at issue 82, which is restored later in source order.
    let export = json!({
        "id": 1,
        "issues": [
            {"id": 81, "iid": 1, "title": "Moved away", "moved_to_id": 82},
            {"id": 82, "iid": 2, "title": "New home"}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));
    assert!(ctx.issues().is_empty(), "issues: {:?}", ctx.issues());

    let moved_to: String = conn
        .query_row(
            "SELECT moved_to_id FROM issues WHERE iid = 1",
            [],
            |row| row.get(0),
        )
        .expect("patched moved_to_id");
    assert_eq!(moved_to, issue_id_by_iid(&conn, 2));
}

#[test]
fn transitive_forward_references_reach_a_fixed_point() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "transitive");

    let export = json!({
        "id": 1,
        "issues": [
            {"id": 1, "iid": 1, "title": "a", "moved_to_id": 2},
            {"id": 2, "iid": 2, "title": "b", "moved_to_id": 3},
            {"id": 3, "iid": 3, "title": "c"}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));
    assert!(ctx.issues().is_empty());

    assert_eq!(
        issue_id_by_iid(&conn, 2),
        conn.query_row("SELECT moved_to_id FROM issues WHERE iid = 1", [], |r| r
            .get::<_, String>(0))
            .expect("a -> b")
    );
    assert_eq!(
        issue_id_by_iid(&conn, 3),
        conn.query_row("SELECT moved_to_id FROM issues WHERE iid = 2", [], |r| r
            .get::<_, String>(0))
            .expect("b -> c")
    );
}

#[test]
fn unresolved_optional_reference_is_dropped_with_a_warning() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "dangling");

    // Milestone 999 is never part of the export.
    let export = json!({
        "id": 1,
        "issues": [
            {"id": 81, "iid": 1, "title": "Dangling milestone", "milestone_id": 999}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));

    assert_eq!(count(&conn, "issues"), 1);
    let milestone: Option<String> = conn
        .query_row("SELECT milestone_id FROM issues WHERE iid = 1", [], |row| {
            row.get(0)
        })
        .expect("milestone column");
    assert_eq!(milestone, None);

    assert_eq!(ctx.issues().len(), 1);
    let issue = &ctx.issues()[0];
    assert_eq!(issue.kind, IssueKind::UnresolvedReference);
    assert_eq!(issue.path, "project/issues[0]");
    assert!(issue.message.contains("milestone 999"));
}

#[test]
fn unresolved_mandatory_reference_is_a_validation_failure() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "mandatory");

    // label 999 never appears, and label links cannot live without one.
    let export = json!({
        "id": 1,
        "issues": [
            {
                "id": 81,
                "iid": 1,
                "title": "Linked to nothing",
                "label_links": [{"id": 91, "label_id": 999}]
            }
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));

    // Partial-success durability: the link row stays, the failure is
    // recorded against it.
    assert_eq!(count(&conn, "label_links"), 1);
    assert_eq!(ctx.issues().len(), 1);
    let issue = &ctx.issues()[0];
    assert_eq!(issue.kind, IssueKind::Validation);
    assert_eq!(issue.path, "project/issues[0]/label_links[0]");
}

#[test]
fn self_reference_resolves_within_one_node() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "self-ref");

    let export = json!({
        "id": 1,
        "issues": [
            {"id": 81, "iid": 1, "title": "Points at itself", "moved_to_id": 81}
        ]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));
    assert!(ctx.issues().is_empty());

    let own_id = issue_id_by_iid(&conn, 1);
    let moved_to: String = conn
        .query_row("SELECT moved_to_id FROM issues WHERE iid = 1", [], |row| {
            row.get(0)
        })
        .expect("self reference");
    assert_eq!(moved_to, own_id);
}
