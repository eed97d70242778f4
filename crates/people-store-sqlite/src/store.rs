//! [`SqliteStore`] — the SQLite implementation of [`PersonStore`] and
//! [`AttributeClassLookup`].

use std::path::Path;

use chrono::{DateTime, Utc};
use people_core::{
  attribute::{AttributeClass, AttributeValue, EMAIL_ATTRIBUTE, USER_ID_ATTRIBUTE},
  person::{NewPerson, PersonRecord},
  store::{AttributeClassLookup, PersonStore},
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ATTRIBUTE_CLASS_COLUMNS, ATTRIBUTE_COLUMNS, PERSON_COLUMNS, RawAttribute,
    RawAttributeClass, RawPerson, assemble, encode_dt, encode_uuid, encode_value,
  },
  schema::SCHEMA,
};

/// Attribute classes every new environment starts with.
const DEFAULT_ATTRIBUTE_CLASSES: &[&str] = &[USER_ID_ATTRIBUTE, EMAIL_ATTRIBUTE];

// ─── Synchronous helpers (run inside `Connection::call`) ─────────────────────

/// A person row plus its attribute rows.
type RawPersonRows = (RawPerson, Vec<RawAttribute>);

fn select_person(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawPersonRows>> {
  let person = conn
    .query_row(
      &format!("SELECT {PERSON_COLUMNS} FROM people p WHERE p.id = ?1"),
      rusqlite::params![id],
      RawPerson::from_row,
    )
    .optional()?;

  let Some(person) = person else {
    return Ok(None);
  };

  let mut stmt = conn.prepare(&format!(
    "SELECT {ATTRIBUTE_COLUMNS}
     FROM attributes a
     JOIN attribute_classes c ON c.id = a.attribute_class_id
     WHERE a.person_id = ?1
     ORDER BY a.created_at, a.id"
  ))?;
  let attributes = stmt
    .query_map(rusqlite::params![id], RawAttribute::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Some((person, attributes)))
}

fn decode_person((person, attributes): RawPersonRows) -> Result<PersonRecord> {
  let attributes = attributes
    .into_iter()
    .map(RawAttribute::into_attribute)
    .collect::<Result<_>>()?;
  person.into_record(attributes)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A people store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Environment setup ─────────────────────────────────────────────────────

  /// Create an environment seeded with the default attribute classes
  /// (`userId`, `email`). Returns the new environment id.
  pub async fn create_environment(&self) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO environments (id, created_at) VALUES (?1, ?2)",
          rusqlite::params![id_str, at_str],
        )?;
        for name in DEFAULT_ATTRIBUTE_CLASSES {
          tx.execute(
            "INSERT INTO attribute_classes
               (id, environment_id, name, archived, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            rusqlite::params![encode_uuid(Uuid::new_v4()), id_str, name, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(environment_id = %id, "created environment");
    Ok(id)
  }

  /// Add a named attribute class to an environment.
  pub async fn create_attribute_class(
    &self,
    environment_id: Uuid,
    name: &str,
  ) -> Result<AttributeClass> {
    let now = Utc::now();
    let class = AttributeClass {
      id: Uuid::new_v4(),
      environment_id,
      name: name.to_owned(),
      archived: false,
      created_at: now,
      updated_at: now,
    };

    let id_str  = encode_uuid(class.id);
    let env_str = encode_uuid(environment_id);
    let name    = class.name.clone();
    let at_str  = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attribute_classes
             (id, environment_id, name, archived, created_at, updated_at)
           VALUES (?1, ?2, ?3, 0, ?4, ?4)",
          rusqlite::params![id_str, env_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(class)
  }

  /// Archive or restore an attribute class. Values on an archived class stay
  /// stored but are hidden from every person.
  pub async fn set_attribute_class_archived(&self, id: Uuid, archived: bool) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE attribute_classes SET archived = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![id_str, archived, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::AttributeClassNotFound(id));
    }
    Ok(())
  }

  /// Record a session for a person at `at`. Returns the session id.
  pub async fn record_session(&self, person_id: Uuid, at: DateTime<Utc>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let id_str     = encode_uuid(id);
    let person_str = encode_uuid(person_id);
    let at_str     = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (id, person_id, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, person_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(id)
  }

  /// Number of attribute rows stored for a person, archived classes included.
  pub async fn attribute_row_count(&self, person_id: Uuid) -> Result<u64> {
    let person_str = encode_uuid(person_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM attributes WHERE person_id = ?1",
          rusqlite::params![person_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count as u64)
  }
}

// ─── PersonStore impl ────────────────────────────────────────────────────────

impl PersonStore for SqliteStore {
  type Error = Error;

  async fn find_person(&self, id: Uuid) -> Result<Option<PersonRecord>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_person(conn, &id_str)?))
      .await?;

    raw.map(decode_person).transpose()
  }

  async fn find_people(&self, environment_id: Uuid) -> Result<Option<Vec<PersonRecord>>> {
    let env_str = encode_uuid(environment_id);

    let raws = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM environments WHERE id = ?1",
            rusqlite::params![env_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();

        if !exists {
          return Ok(None);
        }

        let mut stmt = conn.prepare(&format!(
          "SELECT {PERSON_COLUMNS} FROM people p
           WHERE p.environment_id = ?1
           ORDER BY p.created_at, p.id"
        ))?;
        let people = stmt
          .query_map(rusqlite::params![env_str], RawPerson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTRIBUTE_COLUMNS}
           FROM attributes a
           JOIN attribute_classes c ON c.id = a.attribute_class_id
           JOIN people p            ON p.id = a.person_id
           WHERE p.environment_id = ?1
           ORDER BY a.created_at, a.id"
        ))?;
        let attributes = stmt
          .query_map(rusqlite::params![env_str], RawAttribute::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((people, attributes)))
      })
      .await?;

    raws
      .map(|(people, attributes)| assemble(people, attributes))
      .transpose()
  }

  async fn find_person_by_attribute(
    &self,
    environment_id: Uuid,
    class_name:     &str,
    value:          &AttributeValue,
  ) -> Result<Option<PersonRecord>> {
    let env_str    = encode_uuid(environment_id);
    let class_name = class_name.to_owned();
    let value      = encode_value(value);

    let raw = self
      .conn
      .call(move |conn| {
        let id: Option<String> = conn
          .query_row(
            "SELECT p.id
             FROM people p
             JOIN attributes a        ON a.person_id = p.id
             JOIN attribute_classes c ON c.id = a.attribute_class_id
             WHERE p.environment_id = ?1 AND c.name = ?2 AND a.value = ?3
             ORDER BY p.created_at, p.id
             LIMIT 1",
            rusqlite::params![env_str, class_name, value],
            |r| r.get(0),
          )
          .optional()?;

        match id {
          Some(id) => Ok(select_person(conn, &id)?),
          None => Ok(None),
        }
      })
      .await?;

    raw.map(decode_person).transpose()
  }

  async fn count_active_people(
    &self,
    environment_id: Uuid,
    since:          DateTime<Utc>,
  ) -> Result<u64> {
    let env_str   = encode_uuid(environment_id);
    let since_str = encode_dt(since);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(DISTINCT s.person_id)
           FROM sessions s
           JOIN people p ON p.id = s.person_id
           WHERE p.environment_id = ?1 AND s.created_at >= ?2",
          rusqlite::params![env_str, since_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count as u64)
  }

  async fn create_person(&self, input: NewPerson) -> Result<PersonRecord> {
    let id      = Uuid::new_v4();
    let id_str  = encode_uuid(id);
    let env_str = encode_uuid(input.environment_id);
    let at_str  = encode_dt(Utc::now());
    let attributes: Vec<(String, rusqlite::types::Value)> = input
      .attributes
      .iter()
      .map(|(class_id, value)| (encode_uuid(*class_id), encode_value(value)))
      .collect();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO people (id, environment_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?3)",
          rusqlite::params![id_str, env_str, at_str],
        )?;
        for (class_id, value) in attributes {
          tx.execute(
            "INSERT INTO attributes
               (id, attribute_class_id, person_id, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![encode_uuid(Uuid::new_v4()), class_id, id_str, value, at_str],
          )?;
        }
        let raw = select_person(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    tracing::debug!(person_id = %id, "inserted person");
    raw.map(decode_person).transpose()?.ok_or(Error::PersonNotFound(id))
  }

  async fn delete_person(&self, id: Uuid) -> Result<PersonRecord> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raw = select_person(&tx, &id_str)?;
        if raw.is_some() {
          tx.execute("DELETE FROM people WHERE id = ?1", rusqlite::params![id_str])?;
        }
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(decode_person).transpose()?.ok_or(Error::PersonNotFound(id))
  }

  async fn upsert_attribute(
    &self,
    person_id:          Uuid,
    attribute_class_id: Uuid,
    value:              AttributeValue,
  ) -> Result<()> {
    let attr_id_str   = encode_uuid(Uuid::new_v4());
    let person_str    = encode_uuid(person_id);
    let class_str     = encode_uuid(attribute_class_id);
    let value         = encode_value(&value);
    let at_str        = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO attributes
             (id, attribute_class_id, person_id, value, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)
           ON CONFLICT (attribute_class_id, person_id)
           DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![attr_id_str, class_str, person_str, value, at_str],
        )?;
        tx.execute(
          "UPDATE people SET updated_at = ?2 WHERE id = ?1",
          rusqlite::params![person_str, at_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }
}

// ─── AttributeClassLookup impl ───────────────────────────────────────────────

impl AttributeClassLookup for SqliteStore {
  type Error = Error;

  async fn find_attribute_class(
    &self,
    environment_id: Uuid,
    name:           &str,
  ) -> Result<Option<AttributeClass>> {
    let env_str = encode_uuid(environment_id);
    let name    = name.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ATTRIBUTE_CLASS_COLUMNS} FROM attribute_classes
               WHERE environment_id = ?1 AND name = ?2"
            ),
            rusqlite::params![env_str, name],
            RawAttributeClass::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAttributeClass::into_attribute_class).transpose()
  }
}
