//! Encoding and decoding helpers between domain types and the representations
//! stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microseconds,
//! `Z` suffix) so string comparison in SQL orders them chronologically. UUIDs
//! are stored as hyphenated lowercase strings. Attribute values use SQLite's
//! own dynamic typing: `TEXT` or `REAL`.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use people_core::{
  attribute::{AttributeClass, AttributeValue},
  person::{PersonRecord, RecordAttribute},
};
use rusqlite::{Row, types::Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AttributeValue ───────────────────────────────────────────────────────────

pub fn encode_value(v: &AttributeValue) -> Value {
  match v {
    AttributeValue::Text(s) => Value::Text(s.clone()),
    AttributeValue::Number(n) => Value::Real(*n),
  }
}

pub fn decode_value(v: Value) -> Result<AttributeValue> {
  match v {
    Value::Text(s) => Ok(AttributeValue::Text(s)),
    Value::Real(n) => Ok(AttributeValue::Number(n)),
    Value::Integer(i) => Ok(AttributeValue::Number(i as f64)),
    Value::Null => Err(Error::ValueType("null".into())),
    Value::Blob(_) => Err(Error::ValueType("blob".into())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawPerson::from_row`].
pub const PERSON_COLUMNS: &str = "p.id, p.environment_id, p.created_at, p.updated_at";

/// Raw strings read directly from a `people` row.
pub struct RawPerson {
  pub id:             String,
  pub environment_id: String,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawPerson {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      environment_id: row.get(1)?,
      created_at:     row.get(2)?,
      updated_at:     row.get(3)?,
    })
  }

  pub fn into_record(self, attributes: Vec<RecordAttribute>) -> Result<PersonRecord> {
    Ok(PersonRecord {
      id: decode_uuid(&self.id)?,
      environment_id: decode_uuid(&self.environment_id)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      attributes,
    })
  }
}

/// Column list matching [`RawAttribute::from_row`].
pub const ATTRIBUTE_COLUMNS: &str = "a.person_id, a.value, c.name, c.archived";

/// An `attributes` row joined with its class.
pub struct RawAttribute {
  pub person_id:  String,
  pub value:      Value,
  pub class_name: String,
  pub archived:   bool,
}

impl RawAttribute {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:  row.get(0)?,
      value:      row.get(1)?,
      class_name: row.get(2)?,
      archived:   row.get(3)?,
    })
  }

  pub fn into_attribute(self) -> Result<RecordAttribute> {
    Ok(RecordAttribute {
      value:      decode_value(self.value)?,
      class_name: self.class_name,
      archived:   self.archived,
    })
  }
}

/// Column list matching [`RawAttributeClass::from_row`].
pub const ATTRIBUTE_CLASS_COLUMNS: &str =
  "id, environment_id, name, archived, created_at, updated_at";

/// Raw strings read directly from an `attribute_classes` row.
pub struct RawAttributeClass {
  pub id:             String,
  pub environment_id: String,
  pub name:           String,
  pub archived:       bool,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawAttributeClass {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      environment_id: row.get(1)?,
      name:           row.get(2)?,
      archived:       row.get(3)?,
      created_at:     row.get(4)?,
      updated_at:     row.get(5)?,
    })
  }

  pub fn into_attribute_class(self) -> Result<AttributeClass> {
    Ok(AttributeClass {
      id:             decode_uuid(&self.id)?,
      environment_id: decode_uuid(&self.environment_id)?,
      name:           self.name,
      archived:       self.archived,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Attach attribute rows to their people, keeping store order within each
/// person.
pub fn assemble(
  people: Vec<RawPerson>,
  attributes: Vec<RawAttribute>,
) -> Result<Vec<PersonRecord>> {
  let mut by_person: HashMap<String, Vec<RecordAttribute>> = HashMap::new();
  for raw in attributes {
    let person_id = raw.person_id.clone();
    by_person
      .entry(person_id)
      .or_default()
      .push(raw.into_attribute()?);
  }

  people
    .into_iter()
    .map(|p| {
      let attrs = by_person.remove(&p.id).unwrap_or_default();
      p.into_record(attrs)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let whole = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    let later = whole + chrono::Duration::milliseconds(5);
    assert!(encode_dt(whole) < encode_dt(later));
    assert_eq!(encode_dt(whole).len(), encode_dt(later).len());
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn integer_values_widen_to_numbers() {
    assert_eq!(
      decode_value(Value::Integer(3)).unwrap(),
      AttributeValue::Number(3.0)
    );
    assert!(decode_value(Value::Null).is_err());
  }
}
