//! Handlers for `/environments` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/environments/:id/monthly-active-count` | Cached for six hours |

use axum::{
  Json,
  extract::{Path, State},
};
use people_core::{
  cache::CacheLayer,
  store::{AttributeClassLookup, PersonStore},
};
use serde::Serialize;

use crate::{SharedRepository, error::ApiError};

#[derive(Debug, Serialize)]
pub struct MonthlyActiveCount {
  pub environment_id: String,
  pub count:          u64,
}

/// `GET /environments/:id/monthly-active-count`
pub async fn monthly_active_count<S, L, C>(
  State(repo): State<SharedRepository<S, L, C>>,
  Path(environment_id): Path<String>,
) -> Result<Json<MonthlyActiveCount>, ApiError>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  let count = repo.get_monthly_active_count(&environment_id).await?;
  Ok(Json(MonthlyActiveCount { environment_id, count }))
}
