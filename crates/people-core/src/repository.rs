//! [`PersonRepository`] — the single entry point for reading and writing
//! people.
//!
//! The repository validates ids before touching any collaborator, reshapes
//! store records into [`Person`]s, rewraps operational store failures into
//! [`Error::Database`], and invalidates cached entries after every write.
//!
//! No step is wrapped in a transaction. In particular
//! [`get_or_create_by_external_user_id`](PersonRepository::get_or_create_by_external_user_id)
//! looks up and then creates as two separate store calls, so two concurrent
//! calls for the same user id can both create a person.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  attribute::{AttributeValue, USER_ID_ATTRIBUTE},
  cache::{self, CacheLayer, MONTHLY_ACTIVE_TTL, PERSON_TTL},
  context::RequestContext,
  id::{IdKind, parse_id},
  person::{NewPerson, Person, PersonRecord},
  store::{AttributeClassLookup, PersonStore, StoreError},
};

// ─── Repository ──────────────────────────────────────────────────────────────

/// Data-access façade for people.
///
/// Holds no mutable state of its own; everything lives in the store or the
/// shared cache, both of which are injected.
pub struct PersonRepository<S, L, C> {
  store:             S,
  attribute_classes: L,
  cache:             C,
}

impl<S, L, C> PersonRepository<S, L, C>
where
  S: PersonStore,
  L: AttributeClassLookup,
  C: CacheLayer,
{
  pub fn new(store: S, attribute_classes: L, cache: C) -> Self {
    Self { store, attribute_classes, cache }
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Look up a person. Returns `None` if no person has this id.
  pub async fn get(&self, person_id: &str) -> Result<Option<Person>> {
    let id = parse_id(IdKind::Person, person_id)?;
    self.fetch(id).await
  }

  /// Like [`get`](Self::get), memoised in `ctx` for the rest of the request.
  ///
  /// Writes do not reach the memo: after [`delete`](Self::delete) or
  /// [`update_attribute`](Self::update_attribute), `get_in` with the same
  /// context still returns the person as first read. Use [`get`](Self::get)
  /// to observe a write made earlier in the same request.
  pub async fn get_in(
    &self,
    ctx: &RequestContext,
    person_id: &str,
  ) -> Result<Option<Person>> {
    let id = parse_id(IdKind::Person, person_id)?;
    let cell = ctx.person_cell(id);
    let person = cell.get_or_try_init(move || self.fetch(id)).await?;
    Ok(person.clone())
  }

  /// Like [`get`](Self::get), memoised process-wide for [`PERSON_TTL`] or
  /// until the person is written.
  pub async fn get_cached(&self, person_id: &str) -> Result<Option<Person>> {
    let id = parse_id(IdKind::Person, person_id)?;
    let key = [cache::person_key(id)];
    self
      .cache
      .run_cached(&key, PERSON_TTL, &key, move || self.fetch(id))
      .await
  }

  /// All people in an environment. An environment with nobody in it yields an
  /// empty list.
  pub async fn list(&self, environment_id: &str) -> Result<Vec<Person>> {
    let environment_id = parse_id(IdKind::Environment, environment_id)?;

    let records = self
      .store
      .find_people(environment_id)
      .await
      .map_err(rewrap)?
      .ok_or_else(|| Error::ResourceNotFound {
        resource: "people for environment",
        id:       environment_id.to_string(),
      })?;

    Ok(records.into_iter().map(PersonRecord::into_person).collect())
  }

  /// Number of people in the environment with a session since the start of
  /// the current month. Memoised for [`MONTHLY_ACTIVE_TTL`].
  pub async fn get_monthly_active_count(&self, environment_id: &str) -> Result<u64> {
    let environment_id = parse_id(IdKind::Environment, environment_id)?;
    let key = [cache::monthly_active_key(environment_id)];

    self
      .cache
      .run_cached(&key, MONTHLY_ACTIVE_TTL, &key, move || async move {
        let since = month_start(Utc::now());
        self
          .store
          .count_active_people(environment_id, since)
          .await
          .map_err(rewrap)
      })
      .await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Create a bare person in the environment.
  pub async fn create(&self, environment_id: &str) -> Result<Person> {
    let environment_id = parse_id(IdKind::Environment, environment_id)?;

    let record = self
      .store
      .create_person(NewPerson::new(environment_id))
      .await
      .map_err(rewrap)?;

    self.cache.invalidate(&cache::person_key(record.id)).await;
    tracing::debug!(person_id = %record.id, %environment_id, "created person");

    Ok(record.into_person())
  }

  /// Delete a person and drop its cached entry.
  pub async fn delete(&self, person_id: &str) -> Result<()> {
    let id = parse_id(IdKind::Person, person_id)?;

    let deleted = self.store.delete_person(id).await.map_err(rewrap)?;

    self.cache.invalidate(&cache::person_key(id)).await;
    tracing::debug!(
      person_id = %id,
      environment_id = %deleted.environment_id,
      "deleted person"
    );

    Ok(())
  }

  /// Find the person carrying `user_id` on the `userId` attribute class, or
  /// create one seeded with that attribute.
  ///
  /// Fails with [`Error::MissingAttributeClass`] if the environment has no
  /// `userId` class.
  pub async fn get_or_create_by_external_user_id(
    &self,
    user_id: &str,
    environment_id: &str,
  ) -> Result<Person> {
    let environment_id = parse_id(IdKind::Environment, environment_id)?;
    let value = AttributeValue::from(user_id);

    let existing = self
      .store
      .find_person_by_attribute(environment_id, USER_ID_ATTRIBUTE, &value)
      .await
      .map_err(rewrap)?;
    if let Some(record) = existing {
      return Ok(record.into_person());
    }

    let class = self
      .attribute_classes
      .find_attribute_class(environment_id, USER_ID_ATTRIBUTE)
      .await
      .map_err(rewrap)?
      .ok_or_else(|| {
        tracing::error!(%environment_id, "environment has no userId attribute class");
        Error::MissingAttributeClass {
          name: USER_ID_ATTRIBUTE.to_owned(),
          environment_id,
        }
      })?;

    let record = self
      .store
      .create_person(NewPerson::new(environment_id).with_attribute(class.id, value))
      .await
      .map_err(rewrap)?;

    self.cache.invalidate(&cache::person_key(record.id)).await;
    tracing::debug!(person_id = %record.id, %environment_id, "created person for external user id");

    Ok(record.into_person())
  }

  /// Set one attribute of one person, overwriting any previous value.
  pub async fn update_attribute(
    &self,
    person_id: &str,
    attribute_class_id: &str,
    value: impl Into<AttributeValue>,
  ) -> Result<()> {
    let person_id = parse_id(IdKind::Person, person_id)?;
    let attribute_class_id = parse_id(IdKind::AttributeClass, attribute_class_id)?;

    self
      .store
      .upsert_attribute(person_id, attribute_class_id, value.into())
      .await
      .map_err(rewrap)?;

    self.cache.invalidate(&cache::person_key(person_id)).await;
    Ok(())
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  async fn fetch(&self, id: Uuid) -> Result<Option<Person>> {
    let record = self.store.find_person(id).await.map_err(rewrap)?;
    Ok(record.map(PersonRecord::into_person))
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Rewrap operational store failures; pass everything else through.
fn rewrap<E: StoreError>(err: E) -> Error {
  if err.is_operational() {
    tracing::warn!(error = %err, "store operation failed");
    Error::Database(err.to_string())
  } else {
    Error::Store(Box::new(err))
  }
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
  NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
    .unwrap_or(now)
}
