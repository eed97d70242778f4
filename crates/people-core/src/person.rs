//! Person — the end-user record owned by an environment.
//!
//! Stores hand back a [`PersonRecord`], which mirrors the storage shape: every
//! attribute row joined with its class. The repository turns that into the
//! domain [`Person`] via [`PersonRecord::into_person`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::AttributeValue;

// ─── Domain shape ────────────────────────────────────────────────────────────

/// A person as seen by callers of the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
  pub id:             Uuid,
  /// Set at creation; never changes.
  pub environment_id: Uuid,
  /// Attribute-class name → value. Only non-archived classes appear here.
  pub attributes:     BTreeMap<String, AttributeValue>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

// ─── Storage shape ───────────────────────────────────────────────────────────

/// One attribute row joined with the name and archived flag of its class.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordAttribute {
  pub value:      AttributeValue,
  pub class_name: String,
  pub archived:   bool,
}

/// A person row as returned by a [`PersonStore`](crate::store::PersonStore).
#[derive(Debug, Clone, PartialEq)]
pub struct PersonRecord {
  pub id:             Uuid,
  pub environment_id: Uuid,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  /// In store order; archived classes included.
  pub attributes:     Vec<RecordAttribute>,
}

impl PersonRecord {
  /// Build the domain [`Person`].
  ///
  /// Archived attributes are dropped. If a class name repeats, the later
  /// entry wins.
  pub fn into_person(self) -> Person {
    let mut attributes = BTreeMap::new();
    for attr in self.attributes.into_iter().filter(|a| !a.archived) {
      attributes.insert(attr.class_name, attr.value);
    }

    Person {
      id: self.id,
      environment_id: self.environment_id,
      attributes,
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// Input to [`PersonStore::create_person`](crate::store::PersonStore::create_person).
/// `id` and the timestamps are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub environment_id: Uuid,
  /// `(attribute_class_id, value)` rows created together with the person.
  pub attributes:     Vec<(Uuid, AttributeValue)>,
}

impl NewPerson {
  /// A bare person with no attributes.
  pub fn new(environment_id: Uuid) -> Self {
    Self { environment_id, attributes: Vec::new() }
  }

  pub fn with_attribute(
    mut self,
    attribute_class_id: Uuid,
    value: impl Into<AttributeValue>,
  ) -> Self {
    self.attributes.push((attribute_class_id, value.into()));
    self
  }
}
