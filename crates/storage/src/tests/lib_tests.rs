use super::*;
use std::io::Write;

const SEED: &str = r#"
[[cases]]
id = "C1"
name = "Smith v. Jones"
description = "Contract dispute"
owner = { id = "005xxxxxxxxxxxxAAA", name = "Olivia Owner" }

[[cases.entities]]
id = "00Q00000000AAA1"
name = "Paralegal Pool"
kind = "group"

[[cases]]
id = "C2"
name = "Estate of Doe"
owner = { id = "005yyyyyyyyyyyyBBB" }
"#;

fn seeded() -> MemoryStorage {
    MemoryStorage::from_seed(toml::from_str(SEED).expect("seed"))
}

#[tokio::test]
async fn lists_cases_in_seed_order() {
    let storage = seeded();
    let cases = storage.list_cases().await.expect("cases");
    let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["C1", "C2"]);
    assert_eq!(cases[0].description.as_deref(), Some("Contract dispute"));
}

#[tokio::test]
async fn entities_start_with_owner_then_shares() {
    let storage = seeded();
    let entities = storage
        .list_entities(&CaseId::new("C1"))
        .await
        .expect("entities");
    assert_eq!(entities.len(), 2);
    assert!(entities[0].is_owner);
    assert_eq!(entities[1].kind, EntityKind::Group);
    assert!(!entities[1].is_owner);

    let owner = storage.get_owner(&CaseId::new("C1")).await.expect("owner");
    assert_eq!(owner.id, EntityId::new("005xxxxxxxxxxxx"));
}

#[tokio::test]
async fn create_share_rejects_prefix_duplicates() {
    let storage = seeded();
    let case_id = CaseId::new("C2");
    let created = storage
        .create_share(&case_id, &EntityId::new("00Q00000000AAA1"))
        .await
        .expect("create");
    assert!(created);

    let duplicate = storage
        .create_share(&case_id, &EntityId::new("00Q00000000AAA1XYZ"))
        .await
        .expect("create duplicate");
    assert!(!duplicate);
    assert_eq!(storage.list_entities(&case_id).await.expect("list").len(), 2);
}

#[tokio::test]
async fn delete_share_never_removes_owner() {
    let storage = seeded();
    let case_id = CaseId::new("C1");
    let removed_owner = storage
        .delete_share(&case_id, &EntityId::new("005xxxxxxxxxxxxAAA"))
        .await
        .expect("delete owner");
    assert!(!removed_owner);

    let removed = storage
        .delete_share(&case_id, &EntityId::new("00Q00000000AAA1"))
        .await
        .expect("delete");
    assert!(removed);
    let again = storage
        .delete_share(&case_id, &EntityId::new("00Q00000000AAA1"))
        .await
        .expect("delete again");
    assert!(!again);
}

#[tokio::test]
async fn unknown_case_is_an_error_for_reads_and_false_for_writes() {
    let storage = seeded();
    let missing = CaseId::new("nope");
    assert!(storage.list_entities(&missing).await.is_err());
    assert!(storage.get_owner(&missing).await.is_err());
    assert!(!storage
        .create_share(&missing, &EntityId::new("00Q00000000AAA1"))
        .await
        .expect("create"));
}

#[tokio::test]
async fn insert_case_appends_after_seeded_cases() {
    let storage = seeded();
    storage
        .insert_case(
            CaseSummary {
                id: CaseId::new("C3"),
                name: "New matter".into(),
                description: None,
            },
            EntityRef::new("005zzzzzzzzzzzz"),
        )
        .await;
    let cases = storage.list_cases().await.expect("cases");
    assert_eq!(cases.last().map(|c| c.id.as_str()), Some("C3"));
    let owner = storage.get_owner(&CaseId::new("C3")).await.expect("owner");
    assert!(owner.is_owner);
}

#[tokio::test]
async fn loads_seed_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SEED.as_bytes()).expect("write seed");

    let storage = MemoryStorage::load_seed(file.path()).await.expect("load");
    assert_eq!(storage.list_cases().await.expect("cases").len(), 2);
}

#[tokio::test]
async fn missing_seed_file_reports_path() {
    let err = MemoryStorage::load_seed("/definitely/not/here.toml")
        .await
        .err()
        .expect("missing file");
    assert!(err.to_string().contains("/definitely/not/here.toml"));
}

#[tokio::test]
async fn missing_store_fails_every_call() {
    let store = MissingShareRecordStore;
    let case_id = CaseId::new("C1");
    assert!(store.list_cases().await.is_err());
    assert!(store
        .delete_share(&case_id, &EntityId::new("00Q00000000AAA1"))
        .await
        .is_err());
}
