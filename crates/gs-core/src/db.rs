//! Database integration for migration operations.

use gs_local_db::{
    create_base_tables, Catalog, Environment, MigrationRecord, MigrationStatus, Migrator,
    OverlapPolicy, ReconcileReport, Reconciler,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Entry point for the migration operations on every environment under one
/// data root.
pub struct DatabaseManager {
    migrator: Migrator,
}

impl DatabaseManager {
    /// Create a new database manager with the default data root.
    pub fn new() -> Self {
        Self::with_root(gs_local_db::Database::default_root())
    }

    /// Create a new database manager with a custom data root.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            migrator: Migrator::with_builtin_catalog(root),
        }
    }

    /// Create a database manager with a custom catalog.
    pub fn with_catalog<P: Into<PathBuf>>(root: P, catalog: Catalog) -> Self {
        Self {
            migrator: Migrator::new(root, catalog),
        }
    }

    pub fn root(&self) -> &Path {
        self.migrator.root()
    }

    /// Create the base tables of `environment` if they are missing.
    pub fn initialize(&self, environment: Environment) -> crate::Result<()> {
        let db = self.migrator.open(environment)?;
        create_base_tables(db.connection()).map_err(gs_local_db::Error::from)?;
        info!(%environment, path = %self.migrator.database_path(environment).display(), "Base tables ready");
        Ok(())
    }

    /// Apply all pending migrations strictly, in catalog order.
    pub fn migrate(&self, environment: Environment) -> crate::Result<Vec<String>> {
        Ok(self.migrator.migrate(environment)?)
    }

    /// Report applied and pending migrations.
    pub fn status(&self, environment: Environment) -> crate::Result<MigrationStatus> {
        Ok(self.migrator.status(environment)?)
    }

    /// Record `version` as applied without executing it.
    pub fn mark_applied(&self, environment: Environment, version: &str) -> crate::Result<MigrationRecord> {
        Ok(self.migrator.mark_applied_manually(environment, version)?)
    }

    /// Reconcile the recorded history with the live schema, then migrate.
    pub fn reconcile(
        &self,
        environment: Environment,
        policy: OverlapPolicy,
    ) -> crate::Result<ReconcileReport> {
        Ok(Reconciler::new(&self.migrator)
            .with_policy(policy)
            .reconcile(environment)?)
    }

    /// Get access to the underlying migrator for advanced operations.
    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}
