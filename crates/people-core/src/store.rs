//! The store traits consumed by [`PersonRepository`](crate::PersonRepository).
//!
//! Implemented by storage backends (e.g. `people-store-sqlite`). The
//! repository depends on these abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  attribute::{AttributeClass, AttributeValue},
  person::{NewPerson, PersonRecord},
};

// ─── Error classification ────────────────────────────────────────────────────

/// An error type a store can return.
///
/// Stores must be able to tell a known operational failure (constraint
/// violation, connection trouble, missing row) apart from a programming or
/// decoding error. Operational failures are rewrapped by the repository into
/// [`Error::Database`](crate::Error::Database); everything else propagates
/// unchanged.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn is_operational(&self) -> bool;
}

// ─── Person store ────────────────────────────────────────────────────────────

/// Abstraction over the persistent store for people.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait PersonStore: Send + Sync {
  type Error: StoreError;

  /// Point lookup by id. Returns `None` if no person matches.
  fn find_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PersonRecord>, Self::Error>> + Send + '_;

  /// All people in an environment.
  ///
  /// `None` means the store produced no collection at all (e.g. the
  /// environment is unknown); an environment with no people is `Some(vec![])`.
  fn find_people(
    &self,
    environment_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vec<PersonRecord>>, Self::Error>> + Send + '_;

  /// Find a person in `environment_id` holding `value` on the attribute class
  /// named `class_name`.
  fn find_person_by_attribute<'a>(
    &'a self,
    environment_id: Uuid,
    class_name: &'a str,
    value: &'a AttributeValue,
  ) -> impl Future<Output = Result<Option<PersonRecord>, Self::Error>> + Send + 'a;

  /// Count distinct people in the environment with at least one session
  /// created at or after `since`.
  fn count_active_people(
    &self,
    environment_id: Uuid,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Create a person together with its initial attributes.
  fn create_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<PersonRecord, Self::Error>> + Send + '_;

  /// Delete a person; attributes and sessions go with it. Returns the record
  /// as it was before deletion.
  fn delete_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<PersonRecord, Self::Error>> + Send + '_;

  /// Insert or overwrite the value keyed by `(attribute_class_id, person_id)`.
  fn upsert_attribute(
    &self,
    person_id: Uuid,
    attribute_class_id: Uuid,
    value: AttributeValue,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Attribute-class lookup ──────────────────────────────────────────────────

/// Resolves a named attribute class within an environment.
pub trait AttributeClassLookup: Send + Sync {
  type Error: StoreError;

  fn find_attribute_class<'a>(
    &'a self,
    environment_id: Uuid,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<AttributeClass>, Self::Error>> + Send + 'a;
}

// ─── Shared references ───────────────────────────────────────────────────────

// A borrowed store is a store, so one backend can serve as both the person
// store and the attribute-class lookup without cloning.

impl<T: PersonStore> PersonStore for &T {
  type Error = T::Error;

  async fn find_person(&self, id: Uuid) -> Result<Option<PersonRecord>, T::Error> {
    (**self).find_person(id).await
  }

  async fn find_people(
    &self,
    environment_id: Uuid,
  ) -> Result<Option<Vec<PersonRecord>>, T::Error> {
    (**self).find_people(environment_id).await
  }

  async fn find_person_by_attribute(
    &self,
    environment_id: Uuid,
    class_name: &str,
    value: &AttributeValue,
  ) -> Result<Option<PersonRecord>, T::Error> {
    (**self)
      .find_person_by_attribute(environment_id, class_name, value)
      .await
  }

  async fn count_active_people(
    &self,
    environment_id: Uuid,
    since: DateTime<Utc>,
  ) -> Result<u64, T::Error> {
    (**self).count_active_people(environment_id, since).await
  }

  async fn create_person(&self, input: NewPerson) -> Result<PersonRecord, T::Error> {
    (**self).create_person(input).await
  }

  async fn delete_person(&self, id: Uuid) -> Result<PersonRecord, T::Error> {
    (**self).delete_person(id).await
  }

  async fn upsert_attribute(
    &self,
    person_id: Uuid,
    attribute_class_id: Uuid,
    value: AttributeValue,
  ) -> Result<(), T::Error> {
    (**self)
      .upsert_attribute(person_id, attribute_class_id, value)
      .await
  }
}

impl<T: AttributeClassLookup> AttributeClassLookup for &T {
  type Error = T::Error;

  async fn find_attribute_class(
    &self,
    environment_id: Uuid,
    name: &str,
  ) -> Result<Option<AttributeClass>, T::Error> {
    (**self).find_attribute_class(environment_id, name).await
  }
}
