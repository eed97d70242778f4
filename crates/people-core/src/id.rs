//! Identifier format checks.
//!
//! Every id crossing into the repository arrives as a string and is parsed
//! here before any store or cache access.

use uuid::Uuid;

use crate::{Error, Result};

/// The kind of identifier being parsed; only used to build error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
  Person,
  Environment,
  AttributeClass,
}

impl IdKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Person => "person id",
      Self::Environment => "environment id",
      Self::AttributeClass => "attribute class id",
    }
  }
}

/// Parse `raw` as an identifier of the given kind.
pub fn parse_id(kind: IdKind, raw: &str) -> Result<Uuid> {
  Uuid::try_parse(raw.trim()).map_err(|_| {
    Error::Validation(format!("invalid {}: {raw:?}", kind.as_str()))
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_hyphenated_uuid() {
    let id = Uuid::new_v4();
    let parsed = parse_id(IdKind::Person, &id.to_string()).unwrap();
    assert_eq!(parsed, id);
  }

  #[test]
  fn normalises_uppercase() {
    let id = Uuid::new_v4();
    let upper = id.to_string().to_uppercase();
    assert_eq!(parse_id(IdKind::Environment, &upper).unwrap(), id);
  }

  #[test]
  fn rejects_garbage() {
    for raw in ["", "abc", "not-a-uuid-at-all-0000000000000", "12345"] {
      let err = parse_id(IdKind::AttributeClass, raw).unwrap_err();
      assert!(err.is_validation(), "{raw:?} should fail validation");
      assert!(err.to_string().contains("attribute class id"));
    }
  }
}
