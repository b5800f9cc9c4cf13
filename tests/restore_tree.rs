
use test_support::{complex_export, count, open_store, personal_ctx, restore_value, seed_project};
use treerestore::store;

#[test]
fn restores_the_full_project_tree() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "full-tree");

    // Destination members matching the exported ones.
    let alice = store::create_user(&conn, "alice", "alice@example.com", "Alice").expect("alice");
    let bob = store::create_user(&conn, "bob", "bob@example.com", "Bob").expect("bob");
    store::add_member(&conn, &project_id, &alice, 40).expect("alice membership");
    store::add_member(&conn, &project_id, &bob, 30).expect("bob membership");

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, complex_export()));
    assert!(
        ctx.issues().is_empty(),
        "unexpected issues: {:?}",
        ctx.issues()
    );

    assert_eq!(count(&conn, "labels"), 3);
    assert_eq!(count(&conn, "milestones"), 1);
    assert_eq!(count(&conn, "boards"), 1);
    assert_eq!(count(&conn, "board_lists"), 2);
    assert_eq!(count(&conn, "badges"), 2);
    assert_eq!(count(&conn, "snippets"), 1);
    assert_eq!(count(&conn, "issues"), 2);
    assert_eq!(count(&conn, "notes"), 2);
    assert_eq!(count(&conn, "label_links"), 2);
    assert_eq!(count(&conn, "project_settings"), 1);

    let description: String = conn
        .query_row(
            "SELECT description FROM projects WHERE id = ?",
            [&project_id],
            |row| row.get(0),
        )
        .expect("project description");
    assert_eq!(
        description,
        "Nisi et repellendus ut enim quo accusamus vel magnam."
    );

    // The exported name must not clobber the destination's.
    let name: String = conn
        .query_row(
            "SELECT name FROM projects WHERE id = ?",
            [&project_id],
            |row| row.get(0),
        )
        .expect("project name");
    assert_eq!(name, "full-tree");

    // Author references remapped to destination members.
    let issue_author: String = conn
        .query_row(
            "SELECT author_id FROM issues WHERE iid = 1",
            [],
            |row| row.get(0),
        )
        .expect("issue author");
    assert_eq!(issue_author, alice);

    let snippet_note_author: String = conn
        .query_row(
            "SELECT author_id FROM notes WHERE noteable_kind = 'snippet'",
            [],
            |row| row.get(0),
        )
        .expect("snippet note author");
    assert_eq!(snippet_note_author, bob);

    // Issues point at the restored milestone, not the original id.
    let milestone_id: String = conn
        .query_row(
            "SELECT id FROM milestones WHERE title = 'v1.0'",
            [],
            |row| row.get(0),
        )
        .expect("milestone id");
    let linked: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM issues WHERE milestone_id = ?",
            [&milestone_id],
            |row| row.get(0),
        )
        .expect("issues on milestone");
    assert_eq!(linked, 2);

    // Board lists resolve their labels through the translation table.
    let bug_label: String = conn
        .query_row(
            "SELECT id FROM labels WHERE title = 'bug'",
            [],
            |row| row.get(0),
        )
        .expect("bug label id");
    let list_label: String = conn
        .query_row(
            "SELECT label_id FROM board_lists WHERE position = 0",
            [],
            |row| row.get(0),
        )
        .expect("first list label");
    assert_eq!(list_label, bug_label);

    // Notes hang off their polymorphic parents.
    let issue_note_parent: String = conn
        .query_row(
            "SELECT noteable_id FROM notes WHERE noteable_kind = 'issue'",
            [],
            |row| row.get(0),
        )
        .expect("issue note parent");
    let issue_id: String = conn
        .query_row("SELECT id FROM issues WHERE iid = 1", [], |row| row.get(0))
        .expect("issue id");
    assert_eq!(issue_note_parent, issue_id);
}

#[test]
fn missing_relations_are_not_errors() {
    let conn = open_store();
    let (project_id, importer_id) = seed_project(&conn, "sparse");

    // An older export with only labels; every other relation is absent.
    let export = serde_json::json!({
        "id": 1,
        "description": "sparse export",
        "labels": [{"id": 11, "title": "bug"}]
    });

    let mut ctx = personal_ctx(&project_id, &importer_id);
    assert!(restore_value(&conn, &mut ctx, export));
    assert!(ctx.issues().is_empty());
    assert_eq!(count(&conn, "labels"), 1);
    assert_eq!(count(&conn, "issues"), 0);
    assert_eq!(count(&conn, "boards"), 0);
}
