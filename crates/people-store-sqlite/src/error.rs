//! Error type for `people-store-sqlite`.

use people_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unsupported attribute value type: {0}")]
  ValueType(String),

  #[error("person not found: {0}")]
  PersonNotFound(uuid::Uuid),

  #[error("environment not found: {0}")]
  EnvironmentNotFound(uuid::Uuid),

  #[error("attribute class not found: {0}")]
  AttributeClassNotFound(uuid::Uuid),
}

impl StoreError for Error {
  /// Driver failures and missing rows are operational; decode failures mean
  /// the stored data or this crate is wrong.
  fn is_operational(&self) -> bool {
    match self {
      Self::Database(_)
      | Self::PersonNotFound(_)
      | Self::EnvironmentNotFound(_)
      | Self::AttributeClassNotFound(_) => true,
      Self::Uuid(_) | Self::DateParse(_) | Self::ValueType(_) => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
