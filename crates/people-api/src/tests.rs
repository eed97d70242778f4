//! End-to-end tests: repository over SQLite and the in-process cache, and the
//! HTTP router in front of it.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode},
};
use chrono::Utc;
use people_cache::MemoryCache;
use people_core::{
  Error, PersonRepository,
  attribute::{AttributeValue, USER_ID_ATTRIBUTE},
  context::RequestContext,
  person::Person,
  store::AttributeClassLookup,
};
use people_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::api_router;

type Repo = PersonRepository<SqliteStore, SqliteStore, MemoryCache>;

async fn repo() -> Repo {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  PersonRepository::new(store.clone(), store, MemoryCache::default())
}

// ─── Repository over SQLite ──────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_round_trips() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();

  let created = repo.create(&env.to_string()).await.unwrap();
  let fetched = repo.get(&created.id.to_string()).await.unwrap().unwrap();

  assert_eq!(fetched, created);
  assert_eq!(fetched.environment_id, env);
  assert!(fetched.attributes.is_empty());
}

#[tokio::test]
async fn get_unknown_person_is_absent() {
  let repo = repo().await;
  assert!(repo.get(&Uuid::new_v4().to_string()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_or_create_by_user_id_matches_example() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap().to_string();

  let p1 = repo.get_or_create_by_external_user_id("abc", &env).await.unwrap();
  assert_eq!(p1.attributes.len(), 1);
  assert_eq!(p1.attributes[USER_ID_ATTRIBUTE], AttributeValue::from("abc"));

  let again = repo.get_or_create_by_external_user_id("abc", &env).await.unwrap();
  assert_eq!(again, p1);

  let other = repo.get_or_create_by_external_user_id("def", &env).await.unwrap();
  assert_ne!(other.id, p1.id);

  assert_eq!(repo.list(&env).await.unwrap().len(), 2);
}

#[tokio::test]
async fn find_or_create_needs_user_id_class() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let class = repo
    .store()
    .find_attribute_class(env, USER_ID_ATTRIBUTE)
    .await
    .unwrap();
  assert!(class.is_some());

  // An environment the store has never seen has no attribute classes.
  let bare = Uuid::new_v4();
  let err = repo
    .get_or_create_by_external_user_id("abc", &bare.to_string())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::MissingAttributeClass { environment_id, .. } if environment_id == bare
  ));
}

#[tokio::test]
async fn update_attribute_twice_keeps_one_row() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let class = repo.store().create_attribute_class(env, "plan").await.unwrap();
  let person = repo.create(&env.to_string()).await.unwrap();
  let id = person.id.to_string();

  repo.update_attribute(&id, &class.id.to_string(), "free").await.unwrap();
  repo.update_attribute(&id, &class.id.to_string(), "pro").await.unwrap();

  assert_eq!(repo.store().attribute_row_count(person.id).await.unwrap(), 1);
  let fetched = repo.get(&id).await.unwrap().unwrap();
  assert_eq!(fetched.attributes["plan"], AttributeValue::from("pro"));
}

#[tokio::test]
async fn archived_classes_never_surface() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let class = repo.store().create_attribute_class(env, "legacy").await.unwrap();
  let person = repo.create(&env.to_string()).await.unwrap();
  let id = person.id.to_string();

  repo.update_attribute(&id, &class.id.to_string(), "v").await.unwrap();
  assert!(repo.get(&id).await.unwrap().unwrap().attributes.contains_key("legacy"));

  repo.store().set_attribute_class_archived(class.id, true).await.unwrap();

  let fetched = repo.get(&id).await.unwrap().unwrap();
  assert!(!fetched.attributes.contains_key("legacy"));
  let listed = repo.list(&env.to_string()).await.unwrap();
  assert!(listed.iter().all(|p| !p.attributes.contains_key("legacy")));
}

#[tokio::test]
async fn list_empty_and_unknown_environments() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();

  assert!(repo.list(&env.to_string()).await.unwrap().is_empty());

  let err = repo.list(&Uuid::new_v4().to_string()).await.unwrap_err();
  assert!(matches!(err, Error::ResourceNotFound { .. }));
}

#[tokio::test]
async fn cached_get_tracks_writes_and_deletes() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let class = repo.store().create_attribute_class(env, "plan").await.unwrap();
  let person = repo.create(&env.to_string()).await.unwrap();
  let id = person.id.to_string();

  assert_eq!(repo.get_cached(&id).await.unwrap(), repo.get(&id).await.unwrap());

  repo.update_attribute(&id, &class.id.to_string(), 2.0).await.unwrap();
  let cached = repo.get_cached(&id).await.unwrap().unwrap();
  assert_eq!(cached.attributes["plan"], AttributeValue::Number(2.0));

  repo.delete(&id).await.unwrap();
  assert!(repo.get_cached(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_unknown_person_is_database_error() {
  let repo = repo().await;
  let err = repo.delete(&Uuid::new_v4().to_string()).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));
}

#[tokio::test]
async fn request_context_reuses_first_lookup() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let person = repo.create(&env.to_string()).await.unwrap();
  let id = person.id.to_string();

  let ctx = RequestContext::new();
  let first = repo.get_in(&ctx, &id).await.unwrap();

  // Deleted behind the context's back: the memoised value still answers.
  repo.delete(&id).await.unwrap();
  assert_eq!(repo.get_in(&ctx, &id).await.unwrap(), first);
  assert!(repo.get_in(&RequestContext::new(), &id).await.unwrap().is_none());
}

#[tokio::test]
async fn monthly_active_count_uses_current_month() {
  let repo = repo().await;
  let env = repo.store().create_environment().await.unwrap();
  let a = repo.create(&env.to_string()).await.unwrap();
  let b = repo.create(&env.to_string()).await.unwrap();
  repo.create(&env.to_string()).await.unwrap();

  let start = people_core::repository::month_start(Utc::now());
  repo.store().record_session(a.id, Utc::now()).await.unwrap();
  repo.store().record_session(a.id, start).await.unwrap();
  repo
    .store()
    .record_session(b.id, start - chrono::Duration::days(1))
    .await
    .unwrap();

  assert_eq!(repo.get_monthly_active_count(&env.to_string()).await.unwrap(), 1);
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

async fn app() -> (Router, Arc<Repo>) {
  let repo = Arc::new(repo().await);
  (api_router(repo.clone()), repo)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut req = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      req = req.header("content-type", "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };

  let res = app
    .clone()
    .oneshot(req.body(body).unwrap())
    .await
    .unwrap();
  let status = res.status();
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

#[tokio::test]
async fn http_person_lifecycle() {
  let (app, repo) = app().await;
  let env = repo.store().create_environment().await.unwrap();
  let class = repo.store().create_attribute_class(env, "plan").await.unwrap();

  let (status, created) = send(
    &app,
    Method::POST,
    "/people",
    Some(json!({ "environment_id": env.to_string() })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let person: Person = serde_json::from_value(created).unwrap();

  let uri = format!("/people/{}/attributes/{}", person.id, class.id);
  let (status, _) = send(&app, Method::PUT, &uri, Some(json!({ "value": "pro" }))).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, fetched) = send(&app, Method::GET, &format!("/people/{}", person.id), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fetched["attributes"]["plan"], json!("pro"));

  let (status, listed) = send(
    &app,
    Method::GET,
    &format!("/people?environment_id={env}"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(listed.as_array().map(Vec::len), Some(1));

  let (status, _) = send(&app, Method::DELETE, &format!("/people/{}", person.id), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, body) = send(&app, Method::GET, &format!("/people/{}", person.id), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn http_by_user_id_is_idempotent() {
  let (app, repo) = app().await;
  let env = repo.store().create_environment().await.unwrap().to_string();
  let body = json!({ "environment_id": env, "user_id": "abc" });

  let (status, first) = send(&app, Method::POST, "/people/by-user-id", Some(body.clone())).await;
  assert_eq!(status, StatusCode::OK);
  let (_, second) = send(&app, Method::POST, "/people/by-user-id", Some(body)).await;

  assert_eq!(first["id"], second["id"]);
  assert_eq!(first["attributes"][USER_ID_ATTRIBUTE], json!("abc"));
}

#[tokio::test]
async fn http_malformed_ids_are_bad_requests() {
  let (app, _repo) = app().await;

  let (status, body) = send(&app, Method::GET, "/people/not-an-id", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("person id"));

  let (status, _) = send(&app, Method::DELETE, "/people/not-an-id", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = send(&app, Method::GET, "/people?environment_id=nope", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_unknown_person_is_not_found() {
  let (app, _repo) = app().await;
  let id = Uuid::new_v4();

  let (status, _) = send(&app, Method::DELETE, &format!("/people/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let uri = format!("/people/{id}/attributes/{}", Uuid::new_v4());
  let (status, _) = send(&app, Method::PUT, &uri, Some(json!({ "value": 1 }))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_monthly_active_count() {
  let (app, repo) = app().await;
  let env = repo.store().create_environment().await.unwrap();
  let person = repo.create(&env.to_string()).await.unwrap();
  repo.store().record_session(person.id, Utc::now()).await.unwrap();

  let uri = format!("/environments/{env}/monthly-active-count");
  let (status, body) = send(&app, Method::GET, &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], json!(1));
  assert_eq!(body["environment_id"], json!(env.to_string()));
}
