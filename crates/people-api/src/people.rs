//! Handlers for `/people` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/people` | `?environment_id` required |
//! | `POST`   | `/people` | Body: `{"environment_id":"..."}`; returns 201 |
//! | `POST`   | `/people/by-user-id` | Body: `{"environment_id":"...","user_id":"..."}` |
//! | `GET`    | `/people/:id` | Served from the process-wide cache; 404 if absent |
//! | `DELETE` | `/people/:id` | 404 if absent, else 204 |
//! | `PUT`    | `/people/:id/attributes/:attribute_class_id` | Body: `{"value": "..." \| 1.5}`; 204 |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use people_core::{
  attribute::AttributeValue,
  cache::CacheLayer,
  context::RequestContext,
  person::Person,
  store::{AttributeClassLookup, PersonStore},
};
use serde::Deserialize;

use crate::{SharedRepository, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub environment_id: String,
}

/// `GET /people?environment_id=<id>`
pub async fn list<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Person>>, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  let people = repo.list(&params.environment_id).await?;
  Ok(Json(people))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub environment_id: String,
}

/// `POST /people` — returns 201 + the new [`Person`].
pub async fn create<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  let person = repo.create(&body.environment_id).await?;
  Ok((StatusCode::CREATED, Json(person)))
}

#[derive(Debug, Deserialize)]
pub struct ByUserIdBody {
  pub environment_id: String,
  pub user_id:        String,
}

/// `POST /people/by-user-id` — find the person with this external user id,
/// creating one if needed.
pub async fn get_or_create_by_user_id<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Json(body): Json<ByUserIdBody>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  if body.user_id.is_empty() {
    return Err(ApiError::BadRequest("user_id must not be empty".into()));
  }

  let person = repo
    .get_or_create_by_external_user_id(&body.user_id, &body.environment_id)
    .await?;
  Ok(Json(person))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /people/:id`
pub async fn get_one<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Path(id): Path<String>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  let person = repo
    .get_cached(&id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("person {id} not found")))?;
  Ok(Json(person))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /people/:id`
pub async fn delete_one<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Extension(ctx): Extension<Arc<RequestContext>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  repo
    .get_in(&ctx, &id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("person {id} not found")))?;

  repo.delete(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Attributes ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AttributeBody {
  pub value: AttributeValue,
}

/// `PUT /people/:id/attributes/:attribute_class_id`
pub async fn update_attribute<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Extension(ctx): Extension<Arc<RequestContext>>,
  Path((id, attribute_class_id)): Path<(String, String)>,
  Json(body): Json<AttributeBody>,
) -> Result<StatusCode, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  repo
    .get_in(&ctx, &id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("person {id} not found")))?;

  repo
    .update_attribute(&id, &attribute_class_id, body.value)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}
