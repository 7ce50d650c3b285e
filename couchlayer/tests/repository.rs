mod common;

use common::{CannedSearch, ScriptedClient, User, named_user, user};
use couchlayer::{memory::InMemoryStore, prelude::*};
use serde_json::{Value, json};
use std::sync::Arc;

fn repository() -> Repository<ScriptedClient> {
    Repository::new(ScriptedClient::new())
}

async fn seed(repository: &Repository<ScriptedClient>) -> Vec<User> {
    let mut users = vec![
        named_user("alice", 31),
        named_user("bob", 25),
        named_user("carol", 47),
    ];
    for user in users.iter_mut() {
        repository
            .create(user, &PassThrough)
            .await
            .unwrap();
    }
    repository.client().reset_calls();
    users
}

#[tokio::test]
async fn save_creates_then_updates() {
    let repository = repository();
    let mut alice = user("alice@example.com", 31);

    let saved = repository
        .save(&mut alice, true, &serde_mapper::<User>())
        .await
        .unwrap();

    assert!(alice.is_persisted());
    assert!(alice.revision().starts_with("1-"));
    assert_eq!(saved, alice);

    let first_modified = alice.last_modified();
    alice.age = 32;
    repository
        .save(&mut alice, true, &PassThrough)
        .await
        .unwrap();

    assert!(alice.revision().starts_with("2-"));
    assert!(alice.last_modified() > first_modified);

    let stored = repository
        .get(alice.id(), &serde_mapper::<User>())
        .await
        .unwrap();
    assert_eq!(stored.age, 32);
    assert_eq!(stored.revision(), alice.revision());
}

#[tokio::test]
async fn save_without_generated_id_is_rejected_before_io() {
    let repository = repository();
    let mut alice = user("alice@example.com", 31);

    let err = repository
        .save(&mut alice, false, &PassThrough)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(repository.client().calls(), 0);
}

#[tokio::test]
async fn transient_entities_cannot_be_updated() {
    let repository = repository();
    let mut alice = named_user("alice", 31);

    let err = repository
        .save(&mut alice, true, &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityTransient);

    let err = repository
        .quick_save(&mut alice, &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityTransient);

    assert_eq!(repository.client().calls(), 0);
}

#[tokio::test]
async fn validation_runs_before_any_write() {
    let repository = repository();
    let mut nobody = user("", 20);

    let err = repository
        .save(&mut nobody, true, &PassThrough)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.reason(), "A user needs an email address");
    assert_eq!(repository.client().calls(), 0);
}

#[tokio::test]
async fn create_uses_the_entity_id() {
    let repository = repository();
    let mut alice = named_user("Alice", 31);

    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();
    assert_eq!(alice.id(), "user:alice");
    assert!(alice.revision().starts_with("1-"));

    let err = repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut duplicate = named_user("alice", 50);
    let err = repository
        .create(&mut duplicate, &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SaveFailed);
    assert!(err.cause().unwrap().is_conflict());
}

#[tokio::test]
async fn quick_save_conflicts_on_a_stale_revision() {
    let repository = repository();
    let mut alice = named_user("alice", 31);
    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();

    let mut stale = alice.clone();
    alice.age = 32;
    repository
        .quick_save(&mut alice, &PassThrough)
        .await
        .unwrap();

    stale.age = 40;
    let err = repository
        .quick_save(&mut stale, &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SaveFailed);
    assert!(err.cause().unwrap().is_conflict());

    // save picks up the stored revision first
    repository
        .save(&mut stale, true, &PassThrough)
        .await
        .unwrap();
    assert!(stale.revision().starts_with("3-"));
}

#[tokio::test]
async fn save_reports_store_failures() {
    let repository = repository();
    let mut alice = named_user("alice", 31);
    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();

    repository
        .client()
        .fail_next(StoreError::internal("boom"), 1);
    let err = repository
        .save(&mut alice, true, &PassThrough)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SaveFailed);
    assert_eq!(err.cause().unwrap().status, Some(500));
}

#[tokio::test]
async fn delete_removes_the_current_revision() {
    let repository = repository();
    let users = seed(&repository).await;

    assert!(repository.delete(users[0].id()).await.unwrap());

    let err = repository
        .get(users[0].id(), &PassThrough)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FetchFailed);
    assert!(err.cause().unwrap().is_not_found());

    let err = repository
        .delete(users[0].id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeleteFailed);

    repository.client().reset_calls();
    let err = repository.delete("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(repository.client().calls(), 0);

    assert_eq!(repository.info().await.unwrap().doc_count, 2);
}

#[tokio::test]
async fn get_maps_through_the_given_mapper() {
    let repository = repository();
    let users = seed(&repository).await;

    let email = repository
        .get(
            users[1].id(),
            &map_with(|doc: Value| Ok(doc["emailAddress"].as_str().unwrap_or_default().to_string())),
        )
        .await
        .unwrap();
    assert_eq!(email, "bob@example.com");

    let raw = repository
        .get(users[1].id(), &PassThrough)
        .await
        .unwrap();
    assert_eq!(raw["type"], json!("user"));
    assert_eq!(raw["_id"], json!("user:bob"));
}

#[tokio::test]
async fn find_applies_selector_sort_and_limit() {
    let repository = repository();
    seed(&repository).await;

    let mut selector = Selector::create();
    selector
        .with_property("type")
        .with_value("user")
        .unwrap()
        .on()
        .with_property(User::AGE)
        .with_value(OperatorValue::gt(30))
        .unwrap();

    let query = Query::builder()
        .selector(selector)
        .sort(User::AGE, SortDirection::Desc)
        .build();
    let found = repository
        .find(&query, &serde_mapper::<User>(), None)
        .await
        .unwrap();

    let names: Vec<&str> = found
        .iter()
        .map(|u| u.email.as_str())
        .collect();
    assert_eq!(names, vec!["carol@example.com", "alice@example.com"]);

    let query = Query::builder()
        .selector(Selector::create_with_property(User::EMAIL, "bob@example.com").unwrap())
        .fields(["_id", "emailAddress"])
        .limit(5)
        .build();
    let found = repository
        .find(&query, &PassThrough, None)
        .await
        .unwrap();
    assert_eq!(found, vec![json!({ "_id": "user:bob", "emailAddress": "bob@example.com" })]);
}

#[tokio::test]
async fn find_retries_rate_limited_calls() {
    let repository = repository();
    seed(&repository).await;
    let query = Query::new(Selector::create_with_property("type", "user").unwrap());

    repository
        .client()
        .fail_next(StoreError::too_many_requests("slow down"), 2);
    let found = repository
        .find(&query, &PassThrough, None)
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(repository.client().calls(), 3);
}

#[tokio::test]
async fn find_gives_up_after_the_attempt_budget() {
    let repository = repository();
    seed(&repository).await;
    let query = Query::new(Selector::create_with_property("type", "user").unwrap());

    repository
        .client()
        .fail_next(StoreError::too_many_requests("slow down"), 2);
    let err = repository
        .find(&query, &PassThrough, Some(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert!(err.cause().unwrap().is_transient());
    assert_eq!(repository.client().calls(), 2);

    repository.client().reset_calls();
    repository
        .client()
        .fail_next(StoreError::too_many_requests("slow down"), 1);
    let err = repository
        .find(&query, &PassThrough, Some(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert_eq!(repository.client().calls(), 1);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let repository = repository();
    let query = Query::new(Selector::create_with_property("type", "user").unwrap());

    repository
        .client()
        .fail_next(StoreError::conflict("Document update conflict."), 1);
    let err = repository
        .find(&query, &PassThrough, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert_eq!(repository.client().calls(), 1);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let repository = repository();
    seed(&repository).await;

    repository
        .client()
        .fail_next(StoreError::internal("boom"), 1);
    let info = repository.info().await.unwrap();

    assert_eq!(info.doc_count, 3);
    assert_eq!(repository.client().calls(), 2);
}

#[tokio::test]
async fn fetch_all_returns_rows_or_documents() {
    let repository = repository();
    let users = seed(&repository).await;

    let rows = repository.fetch_all(None, None).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"], json!("user:alice"));
    assert_eq!(rows[0]["value"]["rev"], json!(users[0].revision()));
    assert!(rows[0].get("doc").is_none());

    let options = FetchOptions::builder()
        .include_docs(true)
        .descending(true)
        .limit(2)
        .build();
    let docs = repository
        .fetch_all(Some(&options), None)
        .await
        .unwrap();
    let ids: Vec<&str> = docs
        .iter()
        .filter_map(|d| d["_id"].as_str())
        .collect();
    assert_eq!(ids, vec!["user:carol", "user:bob"]);
}

#[tokio::test]
async fn fetch_all_by_type_reads_a_key_prefix() {
    let repository = repository();
    seed(&repository).await;
    repository
        .bulk_docs(vec![json!({ "_id": "order:1", "type": "order" })])
        .await
        .unwrap();

    let users = repository
        .fetch_all_by_type(Some(&FetchOptions::prefix("user:")), &serde_mapper::<User>(), None)
        .await
        .unwrap();

    assert_eq!(users.len(), 3);
    assert!(users.iter().all(|u| u.entity_type() == "user"));
}

#[tokio::test]
async fn views_return_rows_and_mapped_documents() {
    let store = InMemoryStore::builder()
        .view("users/by_age", |doc| match doc.get("age") {
            Some(age) => vec![(age.clone(), Value::Null)],
            None => vec![],
        })
        .finish();
    let repository = Repository::new(ScriptedClient::wrap(store));
    seed(&repository).await;

    let options = FetchOptions::builder().startkey(30).build();
    let rows = repository
        .query("users/by_age", Some(&options), None)
        .await
        .unwrap();
    let keys: Vec<&Value> = rows.iter().map(|r| &r["key"]).collect();
    assert_eq!(keys, vec![&json!(31), &json!(47)]);

    let users = repository
        .query_by_type("users/by_age", Some(&options), &serde_mapper::<User>(), None)
        .await
        .unwrap();
    assert_eq!(users[0].email, "alice@example.com");
    assert_eq!(users[1].email, "carol@example.com");

    let err = repository
        .query("users/missing", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert!(err.cause().unwrap().is_not_found());

    repository.client().reset_calls();
    let err = repository.query("", None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(repository.client().calls(), 0);
}

#[tokio::test]
async fn bulk_docs_reports_each_document() {
    let repository = repository();
    let users = seed(&repository).await;

    let results = repository
        .bulk_docs(vec![
            json!({ "type": "note", "body": "first" }),
            json!({ "_id": "note:2", "type": "note" }),
            json!({ "_id": users[0].id(), "type": "user" }),
            json!({ "_id": users[1].id(), "_rev": users[1].revision(), "_deleted": true }),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert!(!results[0].id.is_empty());
    assert_eq!(results[1].id, "note:2");
    assert_eq!(results[2].error.as_deref(), Some("conflict"));
    assert!(results[3].is_ok());

    let info = repository.info().await.unwrap();
    assert_eq!(info.doc_count, 4);
    assert_eq!(info.doc_del_count, 1);
}

#[tokio::test]
async fn bulk_docs_is_never_retried() {
    let repository = repository();

    let err = repository.bulk_docs(vec![]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(repository.client().calls(), 0);

    repository
        .client()
        .fail_next(StoreError::too_many_requests("slow down"), 1);
    let err = repository
        .bulk_docs(vec![json!({ "type": "note" })])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BulkWriteFailed);
    assert_eq!(repository.client().calls(), 1);
}

#[tokio::test]
async fn entity_sets_bind_a_mapper() {
    let repository = repository();
    let users = repository.entities(serde_mapper::<User>());

    let mut dave = user("dave@example.com", 28);
    let saved = users.save(&mut dave).await.unwrap();
    assert_eq!(saved.id(), dave.id());

    dave.tags.push("admin".into());
    users.quick_save(&mut dave).await.unwrap();

    let fetched = users.get(dave.id()).await.unwrap();
    assert_eq!(fetched.tags, vec!["admin".to_string()]);

    let found = users
        .find(&Query::new(Selector::create_with_property(User::TAGS, OperatorValue::all(["admin"])).unwrap()))
        .await
        .unwrap();
    assert_eq!(found, vec![fetched]);

    assert!(users.delete(dave.id()).await.unwrap());
    assert!(users.fetch_all(None).await.unwrap().is_empty());
}

fn search_response() -> SearchResponse {
    serde_json::from_value(json!({
        "q": "name:al*",
        "total_rows": 1,
        "limit": 25,
        "rows": [{
            "score": 1.25,
            "id": "user:alice",
            "doc": {
                "_id": "user:alice",
                "_rev": "1-abc",
                "type": "user",
                "timestamp": 1,
                "emailAddress": "alice@example.com",
                "age": 31
            }
        }],
        "bookmark": "g1AAAA"
    }))
    .unwrap()
}

#[tokio::test]
async fn lucene_query_needs_a_search_client() {
    let repository = repository();
    let options = SearchOptions::new("localhost:5985", "app", "users/by_name", "name:al*").unwrap();

    let err = repository
        .lucene_query(&options, &PassThrough, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
}

#[tokio::test]
async fn lucene_query_maps_hits() {
    let search = Arc::new(CannedSearch::new(search_response()));
    let repository = repository().with_search_client(search.clone());
    let options = SearchOptions::new("localhost:5985", "app", "users/by_name", "name:al*")
        .unwrap()
        .include_docs(true);

    search.fail_next(StoreError::too_many_requests("slow down"));
    let response = repository
        .entities(serde_mapper::<User>())
        .search(&options)
        .await
        .unwrap();

    assert_eq!(response.total_rows, 1);
    assert_eq!(response.bookmark.as_deref(), Some("g1AAAA"));
    assert_eq!(response.rows[0].doc.as_ref().unwrap().email, "alice@example.com");
    assert_eq!(
        search.urls(),
        vec![options.url(), options.url()],
    );
    assert!(options.url().contains("q=name:al%2A"));
}

#[test]
fn create_error_is_structured() {
    let err = Repository::<InMemoryStore>::create_error(ErrorKind::QueryFailed, "");
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert_eq!(
        serde_json::to_value(&err).unwrap(),
        json!({ "error": "query_failed", "reason": "query_failed" })
    );

    let err = Repository::<InMemoryStore>::create_error(ErrorKind::SaveFailed, "disk full");
    assert_eq!(err.reason(), "disk full");
    assert!(err.cause().is_none());
}
