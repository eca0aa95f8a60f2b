//! SQLite schema management for GESTIA environments.
//!
//! This crate owns the per-environment database files, the static migration
//! catalog, the `schema_migrations` store, and the two ways of bringing a
//! database up to date: the strict [`Migrator`] and the column-inspecting
//! [`Reconciler`].

pub mod catalog;
pub mod connection;
pub mod environment;
pub mod migrations;
pub mod reconcile;
pub mod schema;
pub mod store;

use std::path::PathBuf;

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for database operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage unavailable at {}: {message}", path.display())]
    StorageUnavailable { path: PathBuf, message: String },

    #[error("Migration {version} failed: {source}")]
    MigrationFailed {
        version: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Unknown migration version: {version}")]
    UnknownVersion { version: String },

    #[error("Migration {version} is already recorded as applied")]
    DuplicateVersion { version: String },

    #[error("Invalid migration catalog: {message}")]
    InvalidCatalog { message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Create a new storage-unavailable error for the given database path.
    pub fn storage_unavailable<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new migration failure for `version`.
    pub fn migration_failed<S: Into<String>>(version: S, source: rusqlite::Error) -> Self {
        Self::MigrationFailed {
            version: version.into(),
            source,
        }
    }

    /// Create a new unknown-version error.
    pub fn unknown_version<S: Into<String>>(version: S) -> Self {
        Self::UnknownVersion {
            version: version.into(),
        }
    }

    /// Create a new duplicate-version error.
    pub fn duplicate_version<S: Into<String>>(version: S) -> Self {
        Self::DuplicateVersion {
            version: version.into(),
        }
    }

    /// Create a new invalid-catalog error.
    pub fn invalid_catalog<S: Into<String>>(message: S) -> Self {
        Self::InvalidCatalog {
            message: message.into(),
        }
    }
}

/// Database connection and management.
pub use connection::Database;

/// Named deployment targets.
pub use environment::{Environment, ParseEnvironmentError};

/// Static migration definitions.
pub use catalog::{Catalog, ColumnRef, MigrationDefinition, MigrationStep};

/// Applied-migration bookkeeping.
pub use store::{MigrationRecord, SchemaStore};

/// Strict, catalog-ordered migration runner.
pub use migrations::{MigrationState, MigrationStatus, Migrator, StatusEntry};

/// Live-schema reconciliation.
pub use reconcile::{
    InferredMigration, LiveSchema, OverlapPolicy, ParseOverlapPolicyError, ReconcileReport,
    Reconciler,
};

/// Schema definitions and constants.
pub use schema::*;
