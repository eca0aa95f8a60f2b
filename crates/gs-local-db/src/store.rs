//! Durable record of applied migrations.

use crate::schema::TABLE_SCHEMA_MIGRATIONS;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeSet;

/// Database model for one applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub version: String,
    pub description: Option<String>,
    pub applied_at: String,
}

/// Database operations on the `schema_migrations` table.
pub struct SchemaStore<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaStore<'a> {
    /// Create a new schema store.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the tracking table if it does not exist yet.
    ///
    /// The column layout matches tables created by earlier releases, which
    /// lack the UNIQUE constraint; [`SchemaStore::record_applied`] checks for
    /// duplicates itself so both layouts behave the same.
    pub fn ensure_initialized(&self) -> crate::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version TEXT NOT NULL UNIQUE,
                description TEXT,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(())
    }

    /// Whether the tracking table exists, without creating it.
    pub fn is_initialized(&self) -> crate::Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE_SCHEMA_MIGRATIONS],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All recorded versions.
    pub fn applied_versions(&self) -> crate::Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare("SELECT version FROM schema_migrations")?;
        let versions = stmt
            .query_map(params![], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(versions)
    }

    /// All records, ordered by version.
    pub fn records(&self) -> crate::Result<Vec<MigrationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT version, description, applied_at
            FROM schema_migrations ORDER BY version
            "#,
        )?;

        let records = stmt
            .query_map(params![], |row| {
                Ok(MigrationRecord {
                    version: row.get(0)?,
                    description: row.get(1)?,
                    applied_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Get the record of `version`, if any.
    pub fn get(&self, version: &str) -> crate::Result<Option<MigrationRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT version, description, applied_at
                FROM schema_migrations WHERE version = ? LIMIT 1
                "#,
                params![version],
                |row| {
                    Ok(MigrationRecord {
                        version: row.get(0)?,
                        description: row.get(1)?,
                        applied_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Record `version` as applied now.
    ///
    /// Fails with [`crate::Error::DuplicateVersion`] if it is already recorded.
    pub fn record_applied(&self, version: &str, description: &str) -> crate::Result<MigrationRecord> {
        if self.get(version)?.is_some() {
            return Err(crate::Error::duplicate_version(version));
        }

        let record = MigrationRecord {
            version: version.to_string(),
            description: Some(description.to_string()),
            applied_at: chrono::Utc::now().to_rfc3339(),
        };

        self.conn
            .execute(
                r#"
                INSERT INTO schema_migrations (version, description, applied_at)
                VALUES (?, ?, ?)
                "#,
                params![record.version, record.description, record.applied_at],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(rusqlite::ErrorCode::ConstraintViolation) => {
                    crate::Error::duplicate_version(version)
                }
                _ => e.into(),
            })?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaStore::new(&conn).ensure_initialized().unwrap();
        conn
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let store = SchemaStore::new(&conn);
        assert!(!store.is_initialized().unwrap());

        store.ensure_initialized().unwrap();
        store.record_applied("001_a", "first").unwrap();
        store.ensure_initialized().unwrap();

        assert!(store.is_initialized().unwrap());
        assert_eq!(store.applied_versions().unwrap().len(), 1);
    }

    #[test]
    fn test_record_applied_and_read_back() {
        let conn = store_conn();
        let store = SchemaStore::new(&conn);

        store.record_applied("002_b", "second").unwrap();
        store.record_applied("001_a", "first").unwrap();

        let versions: Vec<String> = store.applied_versions().unwrap().into_iter().collect();
        assert_eq!(versions, vec!["001_a".to_string(), "002_b".to_string()]);

        let records = store.records().unwrap();
        assert_eq!(records[0].version, "001_a");
        assert_eq!(records[0].description.as_deref(), Some("first"));
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0].applied_at).is_ok());
    }

    #[test]
    fn test_record_applied_rejects_duplicates() {
        let conn = store_conn();
        let store = SchemaStore::new(&conn);

        store.record_applied("001_a", "first").unwrap();
        let err = store.record_applied("001_a", "first").unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateVersion { ref version } if version == "001_a"));
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_record_applied_rejects_duplicates_in_legacy_table() {
        let conn = Connection::open_in_memory().unwrap();
        // Layout written by earlier releases: no UNIQUE constraint on version
        conn.execute_batch(
            r#"
            CREATE TABLE schema_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version TEXT NOT NULL,
                description TEXT,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_migrations (version, description) VALUES ('001_a', 'first');
            "#,
        )
        .unwrap();

        let store = SchemaStore::new(&conn);
        store.ensure_initialized().unwrap();
        assert!(store.record_applied("001_a", "first").is_err());

        let record = store.get("001_a").unwrap().unwrap();
        assert!(!record.applied_at.is_empty());
    }
}
