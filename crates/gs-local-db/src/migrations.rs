//! Database migration management.

use crate::catalog::{Catalog, MigrationDefinition};
use crate::connection::Database;
use crate::environment::Environment;
use crate::store::{MigrationRecord, SchemaStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Applies catalog migrations to environment databases.
///
/// A migrator holds no environment state: every operation names the
/// environment it acts on and opens its own connection for the duration of
/// the call.
#[derive(Debug, Clone)]
pub struct Migrator {
    root: PathBuf,
    catalog: Catalog,
}

impl Migrator {
    /// Create a migrator for databases under `root`.
    pub fn new<P: Into<PathBuf>>(root: P, catalog: Catalog) -> Self {
        Self {
            root: root.into(),
            catalog,
        }
    }

    /// Create a migrator using the built-in catalog.
    pub fn with_builtin_catalog<P: Into<PathBuf>>(root: P) -> Self {
        Self::new(root, Catalog::builtin())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Location of `environment`'s database.
    pub fn database_path(&self, environment: Environment) -> PathBuf {
        environment.database_path(&self.root)
    }

    /// Open `environment`'s database for one logical operation.
    pub fn open(&self, environment: Environment) -> crate::Result<Database> {
        Database::open_environment(&self.root, environment)
    }

    /// Catalog entries not yet recorded, in catalog order.
    pub fn pending(&self, environment: Environment) -> crate::Result<Vec<&MigrationDefinition>> {
        let db = self.open(environment)?;
        let store = SchemaStore::new(db.connection());
        store.ensure_initialized()?;
        let applied = store.applied_versions()?;

        Ok(self
            .catalog
            .all()
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect())
    }

    /// Apply all pending migrations in catalog order.
    ///
    /// Stops at the first failing migration; its partial effects are rolled
    /// back and nothing after it is attempted. Returns the versions newly
    /// applied.
    pub fn migrate(&self, environment: Environment) -> crate::Result<Vec<String>> {
        let db = self.open(environment)?;
        let store = SchemaStore::new(db.connection());
        store.ensure_initialized()?;
        let applied = store.applied_versions()?;

        info!(%environment, "Starting migrations");

        let mut newly_applied = Vec::new();
        for migration in self.catalog.all() {
            if applied.contains(&migration.version) {
                debug!(version = %migration.version, "Migration already applied");
                continue;
            }

            Self::apply(&db, migration)?;
            newly_applied.push(migration.version.clone());
        }

        info!(
            %environment,
            applied = newly_applied.len(),
            total = self.catalog.len(),
            "Migrations up to date"
        );
        Ok(newly_applied)
    }

    /// Run one migration's statements and record it, all in one transaction.
    pub(crate) fn apply(db: &Database, migration: &MigrationDefinition) -> crate::Result<MigrationRecord> {
        info!(
            version = %migration.version,
            description = %migration.description,
            "Applying migration"
        );

        let result = db.transaction(|conn| {
            for step in &migration.steps {
                debug!(version = %migration.version, sql = %step.sql, "Executing statement");
                conn.execute_batch(&step.sql)
                    .map_err(|e| crate::Error::migration_failed(&migration.version, e))?;
            }
            SchemaStore::new(conn).record_applied(&migration.version, &migration.description)
        });

        match &result {
            Ok(_) => info!(version = %migration.version, "Migration applied"),
            Err(e) => warn!(version = %migration.version, error = %e, "Migration rolled back"),
        }
        result
    }

    /// Report which catalog entries are applied and which are pending.
    ///
    /// Read-only: a missing database file or tracking table is reported as
    /// everything pending rather than being created.
    pub fn status(&self, environment: Environment) -> crate::Result<MigrationStatus> {
        let database_path = self.database_path(environment);
        let database_exists = database_path.exists();

        let records = if database_exists {
            let db = Database::open_read_only(&database_path)?;
            let store = SchemaStore::new(db.connection());
            if store.is_initialized()? {
                store.records()?
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let mut by_version: BTreeMap<String, MigrationRecord> = records
            .into_iter()
            .map(|record| (record.version.clone(), record))
            .collect();

        let entries = self
            .catalog
            .all()
            .iter()
            .map(|migration| {
                let state = match by_version.remove(&migration.version) {
                    Some(record) => MigrationState::Applied {
                        applied_at: record.applied_at,
                    },
                    None => MigrationState::Pending,
                };
                StatusEntry {
                    version: migration.version.clone(),
                    description: migration.description.clone(),
                    state,
                }
            })
            .collect();

        Ok(MigrationStatus {
            environment,
            database_path,
            database_exists,
            entries,
            unknown_records: by_version.into_values().collect(),
        })
    }

    /// Record `version` as applied without running its statements.
    ///
    /// For schema changes an operator already made out-of-band.
    pub fn mark_applied_manually(
        &self,
        environment: Environment,
        version: &str,
    ) -> crate::Result<MigrationRecord> {
        let migration = self
            .catalog
            .get(version)
            .ok_or_else(|| crate::Error::unknown_version(version))?;

        let db = self.open(environment)?;
        let store = SchemaStore::new(db.connection());
        store.ensure_initialized()?;
        let record = store.record_applied(&migration.version, &migration.description)?;

        info!(%environment, version, "Migration marked as applied");
        Ok(record)
    }
}

/// Whether a catalog entry has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationState {
    Applied { applied_at: String },
    Pending,
}

/// One catalog entry in a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub version: String,
    pub description: String,
    #[serde(flatten)]
    pub state: MigrationState,
}

impl StatusEntry {
    pub fn is_applied(&self) -> bool {
        matches!(self.state, MigrationState::Applied { .. })
    }
}

/// Diagnostic report of one environment's migration state.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub environment: Environment,
    pub database_path: PathBuf,
    pub database_exists: bool,
    /// Every catalog entry, in catalog order.
    pub entries: Vec<StatusEntry>,
    /// Recorded versions the catalog does not know about.
    pub unknown_records: Vec<MigrationRecord>,
}

impl MigrationStatus {
    pub fn applied(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_applied())
    }

    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| !e.is_applied())
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MigrationStep;
    use tempfile::TempDir;

    fn two_step_catalog() -> Catalog {
        Catalog::new(vec![
            MigrationDefinition::new("001_a", "add a").add_columns("t", &[("a", "TEXT")]),
            MigrationDefinition::new("002_b", "add b and c")
                .add_columns("t", &[("b", "TEXT"), ("c", "TEXT")]),
        ])
        .unwrap()
    }

    fn migrator_with_table(catalog: Catalog) -> (TempDir, Migrator) {
        let temp_dir = TempDir::new().unwrap();
        let migrator = Migrator::new(temp_dir.path(), catalog);
        let db = migrator.open(Environment::Test).unwrap();
        db.connection().execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        (temp_dir, migrator)
    }

    #[test]
    fn test_pending_follows_catalog_order() {
        let (_temp_dir, migrator) = migrator_with_table(two_step_catalog());
        let pending: Vec<_> = migrator
            .pending(Environment::Test)
            .unwrap()
            .iter()
            .map(|m| m.version.clone())
            .collect();
        assert_eq!(pending, vec!["001_a", "002_b"]);
    }

    #[test]
    fn test_apply_failure_writes_no_record() {
        let (_temp_dir, migrator) = migrator_with_table(
            Catalog::new(vec![MigrationDefinition::new("001_bad", "bad")
                .step(MigrationStep::add_column("t", "x", "TEXT"))
                .step(MigrationStep::statement("ALTER TABLE missing ADD COLUMN y TEXT"))])
            .unwrap(),
        );

        let err = migrator.migrate(Environment::Test).unwrap_err();
        assert!(matches!(err, crate::Error::MigrationFailed { ref version, .. } if version == "001_bad"));

        let db = migrator.open(Environment::Test).unwrap();
        assert_eq!(db.table_columns("t").unwrap(), vec!["id".to_string()]);
        assert!(SchemaStore::new(db.connection()).applied_versions().unwrap().is_empty());
    }

    #[test]
    fn test_status_does_not_create_database() {
        let temp_dir = TempDir::new().unwrap();
        let migrator = Migrator::with_builtin_catalog(temp_dir.path());

        let status = migrator.status(Environment::Production).unwrap();
        assert!(!status.database_exists);
        assert_eq!(status.pending_count(), 4);
        assert!(!status.is_up_to_date());
        assert!(!migrator.database_path(Environment::Production).exists());
    }

    #[test]
    fn test_status_reports_unknown_records() {
        let (_temp_dir, migrator) = migrator_with_table(two_step_catalog());
        {
            let db = migrator.open(Environment::Test).unwrap();
            let store = SchemaStore::new(db.connection());
            store.ensure_initialized().unwrap();
            store.record_applied("000_legacy", "from an older build").unwrap();
        }

        let status = migrator.status(Environment::Test).unwrap();
        assert_eq!(status.unknown_records.len(), 1);
        assert_eq!(status.unknown_records[0].version, "000_legacy");
        assert_eq!(status.applied_count(), 0);
    }

    #[test]
    fn test_mark_applied_manually_rejects_duplicates() {
        let (_temp_dir, migrator) = migrator_with_table(two_step_catalog());
        migrator
            .mark_applied_manually(Environment::Test, "001_a")
            .unwrap();
        let err = migrator
            .mark_applied_manually(Environment::Test, "001_a")
            .unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateVersion { .. }));
    }

    #[test]
    fn test_status_serializes_state_inline() {
        let (_temp_dir, migrator) = migrator_with_table(two_step_catalog());
        migrator.migrate(Environment::Test).unwrap();

        let status = migrator.status(Environment::Test).unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["environment"], "test");
        assert_eq!(json["entries"][0]["state"], "applied");
        assert!(json["entries"][0]["applied_at"].is_string());
    }
}
