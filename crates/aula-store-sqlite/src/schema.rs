//! SQL schema for the Aula SQLite backend.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    id           TEXT PRIMARY KEY,
    email        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name TEXT,
    status       TEXT NOT NULL DEFAULT 'active',  -- 'active' | 'inactive' | 'dropped'
    created_at   TEXT NOT NULL
);

-- Tags are stored verbatim; readers normalise them.
-- Row order (rowid) is assignment order; the first row is the primary role.
CREATE TABLE IF NOT EXISTS role_assignments (
    principal_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    role         TEXT NOT NULL,
    assigned_at  TEXT NOT NULL,
    UNIQUE (principal_id, role)
);

CREATE TABLE IF NOT EXISTS credentials (
    principal_id  TEXT PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    updated_at    TEXT NOT NULL
);

-- Only the SHA-256 digest of a reset token is kept.
CREATE TABLE IF NOT EXISTS password_resets (
    token_digest TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    expires_at   TEXT NOT NULL,
    used_at      TEXT
);

CREATE TABLE IF NOT EXISTS snapshots (
    key      TEXT PRIMARY KEY,
    body     TEXT NOT NULL,   -- JSON PersistedSnapshot
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS role_assignments_role_idx ON role_assignments(role);

PRAGMA user_version = 1;
";
