//! JSON REST API over a [`PersonRepository`].
//!
//! Exposes an axum [`Router`] backed by any store, attribute-class lookup and
//! cache the repository accepts. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", people_api::api_router(repository.clone()))
//! ```

pub mod context;
pub mod environments;
pub mod error;
pub mod people;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  middleware,
  routing::{get, post, put},
};
use people_core::{
  PersonRepository,
  cache::CacheLayer,
  store::{AttributeClassLookup, PersonStore},
};
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PEOPLE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  /// Maximum number of entries in the process-wide cache.
  #[serde(default = "default_cache_capacity")]
  pub cache_capacity: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("people.sqlite3") }

fn default_cache_capacity() -> u64 { people_cache::DEFAULT_CAPACITY }

// ─── Router ───────────────────────────────────────────────────────────────────

/// Shared repository handle threaded through all handlers.
pub type SharedRepository<S, L, C> = Arc<PersonRepository<S, L, C>>;

/// Build a fully-materialised API router for `repository`.
///
/// Every request gets a fresh [`RequestContext`](people_core::context::RequestContext),
/// so person lookups repeated within one request hit the store once.
pub fn api_router<S, L, C>(repository: SharedRepository<S, L, C>) -> Router<()>
where
  S: PersonStore + 'static,
  L: AttributeClassLookup + 'static,
  C: CacheLayer + 'static,
{
  Router::new()
    // People
    .route("/people", get(people::list::<S, L, C>).post(people::create::<S, L, C>))
    .route("/people/by-user-id", post(people::get_or_create_by_user_id::<S, L, C>))
    .route(
      "/people/{id}",
      get(people::get_one::<S, L, C>).delete(people::delete_one::<S, L, C>),
    )
    .route(
      "/people/{id}/attributes/{attribute_class_id}",
      put(people::update_attribute::<S, L, C>),
    )
    // Environments
    .route(
      "/environments/{id}/monthly-active-count",
      get(environments::monthly_active_count::<S, L, C>),
    )
    .layer(middleware::from_fn(context::attach_request_context))
    .with_state(repository)
}

#[cfg(test)]
mod tests;
