//! Attribute classes and attribute values.
//!
//! An attribute class is a named slot (e.g. `userId`, `email`) scoped to an
//! environment. A person holds at most one value per attribute class.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the attribute class holding the caller's external user id.
pub const USER_ID_ATTRIBUTE: &str = "userId";

/// Name of the attribute class holding the person's email address.
pub const EMAIL_ATTRIBUTE: &str = "email";

/// A named attribute slot within one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeClass {
  pub id:             Uuid,
  pub environment_id: Uuid,
  pub name:           String,
  /// Archived classes keep their rows but are hidden from every [`Person`].
  ///
  /// [`Person`]: crate::person::Person
  pub archived:       bool,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

/// The value of one attribute: either free text or a number.
///
/// Serialised untagged, so JSON sees a bare string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
  Text(String),
  Number(f64),
}

impl fmt::Display for AttributeValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => f.write_str(s),
      Self::Number(n) => write!(f, "{n}"),
    }
  }
}

impl From<&str> for AttributeValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for AttributeValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<f64> for AttributeValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<i64> for AttributeValue {
  fn from(n: i64) -> Self { Self::Number(n as f64) }
}
