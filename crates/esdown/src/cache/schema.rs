//! `SQLite` schema definitions for the compile cache.
//!
//! This module contains the SQL statements for creating and managing
//! the cache schema.

/// SQL statement to create the compilations table.
pub const CREATE_COMPILATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS compilations (
    source_path TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    output_path TEXT NOT NULL,
    output_fingerprint TEXT NOT NULL,
    compiler_version TEXT NOT NULL,
    compiled_at TEXT NOT NULL
)
";

/// SQL statement to create an index on `compiled_at` for stats queries.
pub const CREATE_COMPILED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_compilations_compiled_at ON compilations(compiled_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_COMPILATIONS_TABLE,
    CREATE_COMPILED_AT_INDEX,
    CREATE_METADATA_TABLE,
];
