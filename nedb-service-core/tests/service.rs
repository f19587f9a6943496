use async_trait::async_trait;
use serde_json::{Value, json};

use nedb_service_core::{
    datastore::Datastore,
    error::{ConfigurationError, ServiceError, StoreError, StoreResult},
    filter::{Expr, FindOptions, Modifier},
    id::Id,
    params::Params,
    record::Record,
    service::{NedbService, Service, ServiceOptions},
};

/// A datastore whose every call fails the same way.
#[derive(Debug)]
struct FailingStore;

fn failure() -> StoreError {
    StoreError::Backend("datafile is locked".to_string())
}

#[async_trait]
impl Datastore for FailingStore {
    async fn count(&self, _filter: &Expr) -> StoreResult<usize> {
        Err(failure())
    }

    async fn find(&self, _filter: &Expr, _options: &FindOptions) -> StoreResult<Vec<Record>> {
        Err(failure())
    }

    async fn insert(&self, _records: Vec<Record>) -> StoreResult<Vec<Record>> {
        Err(failure())
    }

    async fn update(&self, _filter: &Expr, _modifier: Modifier, _multi: bool) -> StoreResult<usize> {
        Err(failure())
    }

    async fn remove(&self, _filter: &Expr, _multi: bool) -> StoreResult<usize> {
        Err(failure())
    }
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn failing_service() -> NedbService<FailingStore> {
    NedbService::new(Some(ServiceOptions::builder().model(FailingStore).build())).unwrap()
}

fn assert_storage(err: ServiceError) {
    match err {
        ServiceError::Storage(message) => assert_eq!(message, "datafile is locked"),
        other => panic!("expected a storage error, got {other:?}"),
    }
}

#[test]
fn construction_requires_options_and_model() {
    let err = NedbService::<FailingStore>::new(None).unwrap_err();
    assert_eq!(err, ConfigurationError::MissingOptions);
    assert_eq!(err.to_string(), "options have to be provided");

    let err = NedbService::<FailingStore>::new(Some(ServiceOptions::default())).unwrap_err();
    assert_eq!(err, ConfigurationError::MissingModel);
    assert_eq!(err.to_string(), "datastore `Model` needs to be provided");
}

#[test]
fn construction_keeps_options() {
    let service = NedbService::new(Some(
        ServiceOptions::builder()
            .model(FailingStore)
            .id("customid")
            .events(["testing"])
            .build(),
    ))
    .unwrap();

    assert_eq!(service.id_field(), "customid");
    assert_eq!(service.events(), ["testing".to_string()]);
}

#[tokio::test]
async fn every_method_wraps_store_failures() {
    let service = failing_service();

    assert_storage(service.find(Params::new()).await.unwrap_err());
    assert_storage(service.get(Id::from("a"), Params::new()).await.unwrap_err());
    assert_storage(
        service
            .create(record(json!({ "name": "a" })).into(), Params::new())
            .await
            .unwrap_err(),
    );
    assert_storage(
        service
            .update(Id::from("a"), record(json!({ "name": "a" })), Params::new())
            .await
            .unwrap_err(),
    );
    assert_storage(
        service
            .patch(None, record(json!({ "name": "a" })), Params::new())
            .await
            .unwrap_err(),
    );
    assert_storage(service.remove(Some(Id::from("a")), Params::new()).await.unwrap_err());
}

#[tokio::test]
async fn malformed_queries_fail_before_reaching_the_store() {
    let service = failing_service();

    let err = service
        .find(Params::from_query(json!({ "$sort": { "age": 2 } })))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::BadRequest(_)));
}
