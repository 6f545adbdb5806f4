use std::collections::BTreeMap;

use lexdraft_core::db::Db;
use lexdraft_core::types::Section;

fn open_db() -> Db {
    let mut db = Db::open(":memory:").expect("open in-memory db");
    db.migrate().expect("migrate");
    db
}

fn section(title: &str) -> Section {
    Section {
        id: 0,
        title: title.to_string(),
        description: format!("{title} description"),
        sample_draft: String::new(),
        requires_meilisearch: false,
        requires_vector_search: false,
        position: 0,
    }
}

#[test]
fn user_insert_and_lookup() {
    let db = open_db();
    let id = db.insert_user("ana@example.com", "hash", "editor").expect("insert");
    let user = db
        .get_user_by_email("ana@example.com")
        .expect("query")
        .expect("present");
    assert_eq!(user.id, id);
    assert_eq!(user.role, "editor");
    assert!(db.get_user_by_email("nope@example.com").expect("query").is_none());
}

#[test]
fn duplicate_email_is_rejected() {
    let db = open_db();
    db.insert_user("ana@example.com", "hash", "user").expect("first");
    assert!(db.insert_user("ana@example.com", "hash2", "user").is_err());
}

#[test]
fn template_round_trip_preserves_section_order() {
    let db = open_db();
    let sections = vec![section("Hechos"), section("Fundamentos"), section("Petición")];
    let id = db
        .insert_template("Demanda", "Demanda de marca", "Honduras", &sections)
        .expect("insert");

    let tpl = db.get_template(id).expect("query").expect("present");
    assert_eq!(tpl.country, "Honduras");
    let titles: Vec<&str> = tpl.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Hechos", "Fundamentos", "Petición"]);
}

#[test]
fn duplicate_section_titles_are_rejected() {
    let db = open_db();
    let sections = vec![section("Hechos"), section("Hechos")];
    assert!(db
        .insert_template("Demanda", "", "Honduras", &sections)
        .is_err());
    // Failed insert rolls back the template row too.
    assert!(db.list_templates().expect("list").is_empty());
}

#[test]
fn deleting_a_template_cascades() {
    let db = open_db();
    let id = db
        .insert_template("Demanda", "", "Honduras", &[section("Hechos")])
        .expect("insert");
    db.insert_uploaded_file(id, "123-doc.pdf", "doc.pdf", "uploads/123-doc.pdf")
        .expect("file");
    assert!(db.delete_template(id).expect("delete"));
    assert!(db.get_template(id).expect("query").is_none());
    assert!(db.list_uploaded_files(id).expect("files").is_empty());
    assert!(!db.delete_template(id).expect("second delete"));
}

#[test]
fn drafts_are_owner_scoped() {
    let db = open_db();
    let owner = db.insert_user("owner@example.com", "h", "user").expect("u1");
    let other = db.insert_user("other@example.com", "h", "user").expect("u2");
    let tpl = db
        .insert_template("Demanda", "", "Honduras", &[section("Hechos")])
        .expect("tpl");

    let mut content = BTreeMap::new();
    content.insert("Hechos".to_string(), "texto".to_string());
    let draft_id = db.insert_draft(tpl, owner, &content).expect("draft");

    assert!(db.get_draft_for_owner(draft_id, owner).expect("q").is_some());
    assert!(db.get_draft_for_owner(draft_id, other).expect("q").is_none());
    assert_eq!(db.list_drafts_for_owner(owner, tpl).expect("q").len(), 1);
    assert!(db.list_drafts_for_owner(other, tpl).expect("q").is_empty());

    content.insert("Hechos".to_string(), "editado".to_string());
    assert!(!db.update_draft_content(draft_id, other, &content).expect("upd"));
    assert!(db.update_draft_content(draft_id, owner, &content).expect("upd"));
    let draft = db
        .get_draft_for_owner(draft_id, owner)
        .expect("q")
        .expect("present");
    assert_eq!(draft.content["Hechos"], "editado");
}

#[test]
fn generation_run_checkpoints_survive_failure() {
    let db = open_db();
    let run = db
        .insert_generation_run("thread_abc", 1, "research")
        .expect("run");
    db.insert_generation_output(run, "research", "notas de investigación")
        .expect("out");
    db.update_generation_run(run, "draft", None).expect("upd");
    db.update_generation_run(run, "failed", Some("run timed out"))
        .expect("fail");

    let row = db.get_generation_run(run).expect("q").expect("present");
    assert_eq!(row.status, "failed");
    assert_eq!(row.error, "run timed out");
    let outputs = db.get_generation_outputs(run).expect("outputs");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].phase, "research");
}

#[test]
fn config_seed_does_not_overwrite() {
    let db = open_db();
    db.set_config("assistant_id", "asst_1").expect("set");
    db.seed_config("assistant_id", "asst_default").expect("seed");
    assert_eq!(
        db.get_config("assistant_id").expect("get").as_deref(),
        Some("asst_1")
    );
}
