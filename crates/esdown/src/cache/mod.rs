//! Compile cache for esdown.
//!
//! Records a fingerprint of every compiled source so unchanged files can be
//! skipped on later builds. Both the script bytes fed to the compiler and
//! the output bytes it produced are fingerprinted; a source is only
//! considered up to date when its output is still byte-for-byte the one we
//! wrote. The cache is disposable: losing it only costs a full recompile,
//! so a schema version mismatch simply discards the cached compilations
//! instead of migrating them.

pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// Metadata key the schema version is stored under.
const VERSION_KEY: &str = "schema_version";

/// A recorded compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The source file that was compiled.
    pub source_path: PathBuf,
    /// Fingerprint of the script bytes fed to the compiler.
    pub fingerprint: String,
    /// Where the compiled output was written.
    pub output_path: PathBuf,
    /// Fingerprint of the output bytes as written.
    pub output_fingerprint: String,
    /// Compiler release that produced the output.
    pub compiler_version: String,
    /// When the compilation happened.
    pub compiled_at: DateTime<Utc>,
}

/// Statistics about the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of recorded compilations.
    pub total_entries: i64,
    /// Timestamp of the oldest recorded compilation.
    pub oldest_compile: Option<DateTime<Utc>>,
    /// Timestamp of the newest recorded compilation.
    pub newest_compile: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Fingerprint file contents for freshness checks.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// `SQLite`-backed record of what has been compiled from what.
#[derive(Debug)]
pub struct CompileCache {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl CompileCache {
    /// Open or create a cache database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening compile cache at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::CacheOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let cache = Self { path, conn };
        cache.initialize()?;
        Ok(cache)
    }

    /// Create an in-memory cache instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::CacheOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        let cache = Self {
            path: PathBuf::from(":memory:"),
            conn,
        };
        cache.initialize()?;
        Ok(cache)
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the schema and reconcile the stored schema version.
    fn initialize(&self) -> Result<()> {
        for statement in schema::SCHEMA_STATEMENTS {
            self.conn.execute(statement, [])?;
        }

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored.as_deref().map(str::parse::<i32>) {
            None => self.set_version(SCHEMA_VERSION)?,
            Some(Ok(version)) if version == SCHEMA_VERSION => {}
            Some(_) => {
                warn!("cache schema version mismatch, discarding cached compilations");
                self.conn.execute("DELETE FROM compilations", [])?;
                self.set_version(SCHEMA_VERSION)?;
            }
        }

        Ok(())
    }

    fn set_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![VERSION_KEY, version.to_string()],
        )?;
        Ok(())
    }

    /// Record a compilation, replacing any earlier record for the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record(
        &self,
        source: &Path,
        script_fingerprint: &str,
        output: &Path,
        output_fingerprint: &str,
        compiler_version: &str,
    ) -> Result<()> {
        let source_path = source.to_string_lossy().into_owned();
        let output_path = output.to_string_lossy().into_owned();
        let compiled_at = Utc::now().to_rfc3339();

        self.conn.execute(
            r"
            INSERT OR REPLACE INTO compilations
                (source_path, fingerprint, output_path, output_fingerprint,
                 compiler_version, compiled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                source_path,
                script_fingerprint,
                output_path,
                output_fingerprint,
                compiler_version,
                compiled_at,
            ],
        )?;

        debug!("Recorded compilation of {}", source.display());
        Ok(())
    }

    /// Get the recorded compilation for a source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn lookup(&self, source: &Path) -> Result<Option<CacheEntry>> {
        let source_path = source.to_string_lossy().into_owned();
        let entry = self
            .conn
            .query_row(
                r"
                SELECT source_path, fingerprint, output_path, output_fingerprint,
                       compiler_version, compiled_at
                FROM compilations WHERE source_path = ?1
                ",
                [source_path],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Whether a source is already compiled: the recorded script fingerprint
    /// and compiler version match, and the recorded output still holds the
    /// bytes we wrote.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn is_fresh(
        &self,
        source: &Path,
        script_fingerprint: &str,
        compiler_version: &str,
    ) -> Result<bool> {
        let Some(entry) = self.lookup(source)? else {
            return Ok(false);
        };
        if entry.fingerprint != script_fingerprint || entry.compiler_version != compiler_version {
            return Ok(false);
        }
        let Ok(output_bytes) = std::fs::read(&entry.output_path) else {
            return Ok(false);
        };
        Ok(fingerprint(&output_bytes) == entry.output_fingerprint)
    }

    /// Drop the record for a source file.
    ///
    /// Returns `true` if a record was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn evict(&self, source: &Path) -> Result<bool> {
        let source_path = source.to_string_lossy().into_owned();
        let affected = self
            .conn
            .execute("DELETE FROM compilations WHERE source_path = ?1", [source_path])?;
        Ok(affected > 0)
    }

    /// Drop all records.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM compilations", [])?;
        if affected > 0 {
            info!("Cleared {} cached compilations", affected);
        }
        Ok(affected)
    }

    /// Count recorded compilations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM compilations", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All recorded compilations, ordered by source path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT source_path, fingerprint, output_path, output_fingerprint,
                   compiler_version, compiled_at
            FROM compilations ORDER BY source_path ASC
            ",
        )?;

        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Get cache statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<CacheStats> {
        let total_entries = self.count()?;

        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT compiled_at FROM compilations ORDER BY compiled_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT compiled_at FROM compilations ORDER BY compiled_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let oldest_compile = oldest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let newest_compile = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(CacheStats {
            total_entries,
            oldest_compile,
            newest_compile,
            db_size_bytes,
        })
    }

    /// Convert a database row to a `CacheEntry`.
    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
        let source_path: String = row.get(0)?;
        let script_fingerprint: String = row.get(1)?;
        let output_path: String = row.get(2)?;
        let output_fingerprint: String = row.get(3)?;
        let compiler_version: String = row.get(4)?;
        let compiled_at_str: String = row.get(5)?;

        let compiled_at = DateTime::parse_from_rfc3339(&compiled_at_str)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

        Ok(CacheEntry {
            source_path: PathBuf::from(source_path),
            fingerprint: script_fingerprint,
            output_path: PathBuf::from(output_path),
            output_fingerprint,
            compiler_version,
            compiled_at,
        })
    }
}
