//! SQL schema for the people SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS environments (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attribute_classes (
    id              TEXT PRIMARY KEY,
    environment_id  TEXT NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    archived        INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (environment_id, name)
);

CREATE TABLE IF NOT EXISTS people (
    id              TEXT PRIMARY KEY,
    environment_id  TEXT NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- One value per (attribute class, person). `value` is TEXT or REAL.
CREATE TABLE IF NOT EXISTS attributes (
    id                  TEXT PRIMARY KEY,
    attribute_class_id  TEXT NOT NULL REFERENCES attribute_classes(id) ON DELETE CASCADE,
    person_id           TEXT NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    value               NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (attribute_class_id, person_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    person_id   TEXT NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS people_environment_idx  ON people(environment_id);
CREATE INDEX IF NOT EXISTS attributes_person_idx   ON attributes(person_id);
CREATE INDEX IF NOT EXISTS sessions_person_idx     ON sessions(person_id, created_at);

PRAGMA user_version = 1;
";
