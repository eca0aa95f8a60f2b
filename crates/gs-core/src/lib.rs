//! Database orchestration for GESTIA.
//!
//! This crate ties the schema-migration machinery of `gs-local-db` to the
//! application: settings resolved from the environment, a manager exposing
//! the operator operations per environment, and the startup hook.

pub mod db;
pub mod error;
pub mod settings;
pub mod startup;

/// Core result type used throughout the GESTIA orchestration layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all orchestration operations.
pub use error::Error;

/// Database integration for migrations.
pub use db::DatabaseManager;

/// Settings and their environment variables.
pub use settings::{Settings, StartupMode};

/// Startup-time schema check.
pub use startup::run_on_startup;

/// Re-exported so callers need not depend on `gs-local-db` directly.
pub use gs_local_db::{Environment, MigrationStatus, OverlapPolicy, ReconcileReport};
