use serde_json::{Value, json};

use nedb_service::{datastore::EmbeddedStore, prelude::*};

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn service() -> NedbService<EmbeddedStore> {
    NedbService::new(Some(
        ServiceOptions::builder()
            .model(EmbeddedStore::in_memory())
            .events(["testing"])
            .build(),
    ))
    .unwrap()
}

fn id_of(record: &Record, field: &str) -> Id {
    record.get(field).and_then(Id::from_value).unwrap()
}

fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .collect()
}

async fn people(service: &NedbService<EmbeddedStore>) -> Vec<Record> {
    service
        .create(
            vec![
                record(json!({ "name": "Alice", "age": 30 })),
                record(json!({ "name": "Bob", "age": 25 })),
                record(json!({ "name": "Carol", "age": 35 })),
                record(json!({ "name": "Dave", "age": 40 })),
            ]
            .into(),
            Params::new(),
        )
        .await
        .unwrap()
        .into_vec()
}

#[tokio::test]
async fn create_then_get_returns_the_record() {
    let service = service();

    let created = service
        .create(record(json!({ "name": "Alice", "age": 30 })).into(), Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();

    assert_eq!(created.get("name"), Some(&json!("Alice")));

    let fetched = service
        .get(id_of(&created, "_id"), Params::new())
        .await
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_keeps_the_input_shape() {
    let service = service();

    let many = service
        .create(vec![record(json!({ "name": "Alice" }))].into(), Params::new())
        .await
        .unwrap();

    assert!(!many.is_one());
    assert_eq!(many.into_vec().len(), 1);
}

#[tokio::test]
async fn find_sorts_by_age() {
    let service = service();
    service
        .create(
            vec![
                record(json!({ "name": "Alice", "age": 30 })),
                record(json!({ "name": "Bob", "age": 25 })),
            ]
            .into(),
            Params::new(),
        )
        .await
        .unwrap();

    let page = service
        .find(Params::from_query(json!({ "$sort": { "age": 1 } })))
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(names(&page.data), ["Bob", "Alice"]);
}

#[tokio::test]
async fn find_paginates_and_reports_the_full_total() {
    let service = service();
    people(&service).await;

    let page = service
        .find(Params::from_query(json!({ "$sort": { "age": -1 }, "$limit": 2, "$skip": 1 })))
        .await
        .unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(page.limit, 2);
    assert_eq!(page.skip, 1);
    assert_eq!(names(&page.data), ["Carol", "Alice"]);

    let page = service
        .find(Params::from_query(json!({ "age": { "$gt": 26 }, "$limit": 0 })))
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert!(page.data.is_empty());
}

#[tokio::test]
async fn find_applies_service_pagination() {
    let service = NedbService::new(Some(
        ServiceOptions::builder()
            .model(EmbeddedStore::in_memory())
            .paginate(Paginate::new(Some(2), Some(3)))
            .build(),
    ))
    .unwrap();
    people(&service).await;

    let page = service.find(Params::new()).await.unwrap();
    assert_eq!((page.total, page.limit, page.data.len()), (4, 2, 2));

    let page = service
        .find(Params::from_query(json!({ "$limit": 10 })))
        .await
        .unwrap();
    assert_eq!((page.limit, page.data.len()), (3, 3));
}

#[tokio::test]
async fn find_selects_fields_and_keeps_the_id() {
    let service = service();
    people(&service).await;

    let page = service
        .find(Params::from_query(json!({ "name": "Bob", "$select": ["name"] })))
        .await
        .unwrap();

    assert_eq!(page.data.len(), 1);
    let bob = &page.data[0];
    assert!(bob.contains_key("_id"));
    assert!(bob.contains_key("name"));
    assert!(!bob.contains_key("age"));
}

#[tokio::test]
async fn find_supports_logical_and_membership_operators() {
    let service = service();
    people(&service).await;

    let page = service
        .find(Params::from_query(json!({
            "$or": [{ "name": "Alice" }, { "age": { "$gte": 40 } }],
            "$sort": { "name": 1 }
        })))
        .await
        .unwrap();
    assert_eq!(names(&page.data), ["Alice", "Dave"]);

    let page = service
        .find(Params::from_query(json!({
            "name": { "$in": ["Bob", "Carol"] },
            "$sort": { "name": 1 }
        })))
        .await
        .unwrap();
    assert_eq!(names(&page.data), ["Bob", "Carol"]);
}

#[tokio::test]
async fn unknown_operators_surface_as_storage_errors() {
    let service = service();
    people(&service).await;

    let err = service
        .find(Params::from_query(json!({ "age": { "$between": [1, 2] } })))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Storage(ref message) if message == "Unknown comparison function $between"));
}

#[tokio::test]
async fn get_missing_record_is_not_found() {
    let service = service();

    let err = service.get(Id::from("nope"), Params::new()).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No record found for id 'nope'");
}

#[tokio::test]
async fn update_replaces_the_record() {
    let service = service();
    let created = people(&service).await;
    let alice = id_of(&created[0], "_id");

    let updated = service
        .update(alice.clone(), record(json!({ "name": "Alicia" })), Params::new())
        .await
        .unwrap();

    assert_eq!(updated.get("name"), Some(&json!("Alicia")));
    assert!(!updated.contains_key("age"));
    assert_eq!(id_of(&updated, "_id"), alice);
}

#[tokio::test]
async fn update_missing_record_needs_upsert() {
    let service = service();

    let err = service
        .update(Id::from("alice"), record(json!({ "name": "Alice" })), Params::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let upserted = service
        .update(
            Id::from("alice"),
            record(json!({ "name": "Alice" })),
            Params::new().with_upsert(true),
        )
        .await
        .unwrap();
    assert_eq!(upserted.get("_id"), Some(&json!("alice")));

    let fetched = service.get(Id::from("alice"), Params::new()).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("Alice")));
}

#[tokio::test]
async fn upsert_does_not_overwrite_a_record_the_query_excludes() {
    let service = service();
    service
        .create(record(json!({ "_id": "alice", "name": "Alice", "age": 30 })).into(), Params::new())
        .await
        .unwrap();

    let mut params = Params::from_query(json!({ "age": { "$gt": 40 } })).with_upsert(true);
    let err = service
        .update(Id::from("alice"), record(json!({ "name": "Alicia" })), params.clone())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let fetched = service.get(Id::from("alice"), Params::new()).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("Alice")));

    params.query = record(json!({ "age": { "$lt": 40 } }));
    let updated = service
        .update(Id::from("alice"), record(json!({ "name": "Alicia" })), params)
        .await
        .unwrap();
    assert_eq!(updated.get("name"), Some(&json!("Alicia")));
}

#[tokio::test]
async fn patch_merges_one_record() {
    let service = service();
    let created = people(&service).await;
    let bob = id_of(&created[1], "_id");

    let patched = service
        .patch(Some(bob), record(json!({ "age": 26 })), Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();

    assert_eq!(patched.get("name"), Some(&json!("Bob")));
    assert_eq!(patched.get("age"), Some(&json!(26)));

    let err = service
        .patch(Some(Id::from("nope")), record(json!({ "age": 1 })), Params::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn patch_without_id_updates_every_match() {
    let service = service();
    people(&service).await;

    let patched = service
        .patch(
            None,
            record(json!({ "senior": true })),
            Params::from_query(json!({ "age": { "$gte": 35 } })),
        )
        .await
        .unwrap()
        .into_many()
        .unwrap();

    let mut patched_names = names(&patched);
    patched_names.sort();
    assert_eq!(patched_names, ["Carol", "Dave"]);

    let page = service
        .find(Params::from_query(json!({ "senior": true })))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn remove_then_get_is_not_found() {
    let service = service();
    let created = people(&service).await;
    let alice = id_of(&created[0], "_id");

    let removed = service
        .remove(Some(alice.clone()), Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(removed.get("name"), Some(&json!("Alice")));

    let err = service.get(alice.clone(), Params::new()).await.unwrap_err();
    assert!(err.is_not_found());

    let err = service.remove(Some(alice), Params::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn remove_without_id_removes_every_match() {
    let service = service();
    people(&service).await;

    let removed = service
        .remove(None, Params::from_query(json!({ "age": { "$lt": 35 } })))
        .await
        .unwrap()
        .into_many()
        .unwrap();

    let mut removed_names = names(&removed);
    removed_names.sort();
    assert_eq!(removed_names, ["Alice", "Bob"]);
    assert_eq!(service.find(Params::new()).await.unwrap().total, 2);
}

#[tokio::test]
async fn custom_id_field() {
    let service = NedbService::new(Some(
        ServiceOptions::builder()
            .model(EmbeddedStore::in_memory())
            .id("customid")
            .build(),
    ))
    .unwrap();

    let created = service
        .create(
            record(json!({ "customid": "alice", "name": "Alice" })).into(),
            Params::new(),
        )
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(created.get("customid"), Some(&json!("alice")));

    let generated = service
        .create(record(json!({ "name": "Bob" })).into(), Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();
    let bob = id_of(&generated, "customid");

    let fetched = service.get(Id::from("alice"), Params::new()).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("Alice")));

    let updated = service
        .update(Id::from("alice"), record(json!({ "name": "Alicia" })), Params::new())
        .await
        .unwrap();
    assert_eq!(updated.get("customid"), Some(&json!("alice")));
    assert_eq!(updated.get("name"), Some(&json!("Alicia")));

    let patched = service
        .patch(Some(bob.clone()), record(json!({ "age": 25 })), Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(patched.get("age"), Some(&json!(25)));

    service.remove(Some(bob.clone()), Params::new()).await.unwrap();
    assert!(service.get(bob, Params::new()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn file_backed_service_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");

    let store = EmbeddedStore::builder()
        .filename(&path)
        .autoload(true)
        .build()
        .await
        .unwrap();
    let service = NedbService::new(Some(ServiceOptions::builder().model(store).build())).unwrap();
    people(&service).await;

    let store = EmbeddedStore::builder()
        .filename(&path)
        .autoload(true)
        .build()
        .await
        .unwrap();
    let restarted = NedbService::new(Some(ServiceOptions::builder().model(store).build())).unwrap();

    let page = restarted
        .find(Params::from_query(json!({ "$sort": { "age": 1 }, "$limit": 1 })))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(names(&page.data), ["Bob"]);
}
