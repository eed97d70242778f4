//! Error types for `people-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// An input failed its format check; no collaborator was called.
  #[error("validation error: {0}")]
  Validation(String),

  /// A recognised, operational store failure (constraint violation, lost
  /// connection, missing row on delete, ...).
  #[error("database error: {0}")]
  Database(String),

  /// The store returned no collection where one was expected.
  #[error("{resource} not found: {id}")]
  ResourceNotFound { resource: &'static str, id: String },

  /// A required attribute class is not configured for the environment. This
  /// is an operator setup error and is not expected at runtime.
  #[error("attribute class {name:?} is not configured for environment {environment_id}")]
  MissingAttributeClass { name: String, environment_id: Uuid },

  /// Any other store failure, passed through unchanged.
  #[error(transparent)]
  Store(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn is_validation(&self) -> bool { matches!(self, Self::Validation(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
