//! Reconciliation of recorded migration history with the live schema.
//!
//! Some databases had their tables created with the full column set while
//! others grew them through migrations, so the `schema_migrations` history can
//! lag behind what the tables actually contain. The reconciler looks at the
//! live columns before running anything: a pending migration whose added
//! columns are (mostly) present is recorded without being executed, the rest
//! go through the ordinary [`Migrator`] path.

use crate::catalog::{ColumnRef, MigrationDefinition};
use crate::connection::Database;
use crate::environment::Environment;
use crate::migrations::Migrator;
use crate::store::SchemaStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How much of a migration's added columns must already exist for it to be
/// considered applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// At least half of the columns.
    #[default]
    Majority,
    /// Every column.
    Complete,
}

impl OverlapPolicy {
    /// Whether `present` out of `total` added columns is enough.
    ///
    /// A migration with no known added columns is never accepted.
    pub fn accepts(&self, present: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        match self {
            OverlapPolicy::Majority => present * 2 >= total,
            OverlapPolicy::Complete => present == total,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlapPolicy::Majority => "majority",
            OverlapPolicy::Complete => "complete",
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known overlap policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown overlap policy '{name}' (expected majority or complete)")]
pub struct ParseOverlapPolicyError {
    pub name: String,
}

impl FromStr for OverlapPolicy {
    type Err = ParseOverlapPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "majority" => Ok(OverlapPolicy::Majority),
            "complete" => Ok(OverlapPolicy::Complete),
            _ => Err(ParseOverlapPolicyError {
                name: s.to_string(),
            }),
        }
    }
}

/// Columns present on a set of tables at one point in time.
///
/// Names compare ASCII-case-insensitively, like SQLite identifiers.
#[derive(Debug, Clone, Default)]
pub struct LiveSchema {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl LiveSchema {
    /// Read the current columns of each of `tables`.
    pub fn capture<'t, I>(db: &Database, tables: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = &'t str>,
    {
        let mut live = Self::default();
        for table in tables {
            let columns = db.table_columns(table)?;
            live.insert(table, columns);
        }
        Ok(live)
    }

    /// Set the columns of `table`.
    pub fn insert<I, S>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tables.insert(
            table.to_ascii_lowercase(),
            columns
                .into_iter()
                .map(|c| c.as_ref().to_ascii_lowercase())
                .collect(),
        );
    }

    pub fn contains(&self, column: &ColumnRef) -> bool {
        self.tables
            .get(&column.table.to_ascii_lowercase())
            .is_some_and(|cols| cols.contains(&column.column.to_ascii_lowercase()))
    }

    /// Lowercased column names of `table`, if it was captured.
    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(&table.to_ascii_lowercase())
    }
}

/// A pending migration recorded without execution because its columns
/// already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredMigration {
    pub version: String,
    pub present: Vec<String>,
    /// Added columns that do not exist and will not be created.
    pub missing: Vec<String>,
}

impl InferredMigration {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub environment: Environment,
    /// Versions that were already recorded.
    pub already_applied: Vec<String>,
    /// Versions recorded from the live schema without execution.
    pub inferred: Vec<InferredMigration>,
    /// Versions whose statements were executed.
    pub executed: Vec<String>,
}

impl ReconcileReport {
    /// Whether anything was executed or newly recorded.
    pub fn changed(&self) -> bool {
        !self.inferred.is_empty() || !self.executed.is_empty()
    }

    /// Inferred migrations that left some of their columns missing.
    pub fn partial(&self) -> impl Iterator<Item = &InferredMigration> {
        self.inferred.iter().filter(|m| m.is_partial())
    }
}

/// Brings an environment up to date, tolerating schema drift.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'m> {
    migrator: &'m Migrator,
    policy: OverlapPolicy,
}

impl<'m> Reconciler<'m> {
    pub fn new(migrator: &'m Migrator) -> Self {
        Self {
            migrator,
            policy: OverlapPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Decide whether `migration` is already reflected in `live`.
    ///
    /// Returns `None` when it must be executed.
    pub fn classify(
        &self,
        migration: &MigrationDefinition,
        live: &LiveSchema,
    ) -> Option<InferredMigration> {
        let (present, missing): (Vec<&ColumnRef>, Vec<&ColumnRef>) =
            migration.added_columns().partition(|c| live.contains(c));

        if !self.policy.accepts(present.len(), present.len() + missing.len()) {
            return None;
        }

        Some(InferredMigration {
            version: migration.version.clone(),
            present: present.into_iter().map(|c| c.column.clone()).collect(),
            missing: missing.into_iter().map(|c| c.column.clone()).collect(),
        })
    }

    /// Record already-present migrations, then execute the others in
    /// catalog order.
    ///
    /// Execution is fail-fast exactly as in [`Migrator::migrate`]; records
    /// written for inferred migrations before a failure are kept.
    pub fn reconcile(&self, environment: Environment) -> crate::Result<ReconcileReport> {
        let db = self.migrator.open(environment)?;
        let store = SchemaStore::new(db.connection());
        store.ensure_initialized()?;
        let applied = store.applied_versions()?;

        let mut report = ReconcileReport {
            environment,
            already_applied: Vec::new(),
            inferred: Vec::new(),
            executed: Vec::new(),
        };

        let mut pending = Vec::new();
        for migration in self.migrator.catalog().all() {
            if applied.contains(&migration.version) {
                debug!(version = %migration.version, "Migration already applied");
                report.already_applied.push(migration.version.clone());
            } else {
                pending.push(migration);
            }
        }

        if pending.is_empty() {
            info!(%environment, "Schema up to date, nothing to reconcile");
            return Ok(report);
        }

        let tables: BTreeSet<&str> = pending
            .iter()
            .flat_map(|m| m.added_columns())
            .map(|c| c.table.as_str())
            .collect();
        let live = LiveSchema::capture(&db, tables)?;

        let mut must_execute = Vec::new();
        for migration in pending {
            match self.classify(migration, &live) {
                Some(inferred) => {
                    if inferred.is_partial() {
                        warn!(
                            version = %migration.version,
                            missing = ?inferred.missing,
                            policy = %self.policy,
                            "Marking migration applied although some of its columns are missing"
                        );
                    }
                    store.record_applied(&migration.version, &migration.description)?;
                    info!(
                        version = %migration.version,
                        present = inferred.present.len(),
                        "Columns already exist, migration marked as applied"
                    );
                    report.inferred.push(inferred);
                }
                None => {
                    debug!(version = %migration.version, "Columns missing, migration must run");
                    must_execute.push(migration);
                }
            }
        }

        for migration in must_execute {
            Migrator::apply(&db, migration)?;
            report.executed.push(migration.version.clone());
        }

        info!(
            %environment,
            inferred = report.inferred.len(),
            executed = report.executed.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MigrationStep;

    fn live(columns: &[&str]) -> LiveSchema {
        let mut live = LiveSchema::default();
        live.insert("t", columns.iter().copied());
        live
    }

    #[test]
    fn test_majority_policy_threshold() {
        let policy = OverlapPolicy::Majority;
        assert!(policy.accepts(1, 2));
        assert!(policy.accepts(2, 3));
        assert!(!policy.accepts(1, 3));
        assert!(!policy.accepts(0, 2));
        assert!(!policy.accepts(0, 0));
    }

    #[test]
    fn test_complete_policy_threshold() {
        let policy = OverlapPolicy::Complete;
        assert!(policy.accepts(2, 2));
        assert!(!policy.accepts(1, 2));
        assert!(!policy.accepts(0, 0));
    }

    #[test]
    fn test_parse_overlap_policy() {
        assert_eq!("majority".parse(), Ok(OverlapPolicy::Majority));
        assert_eq!("Complete".parse(), Ok(OverlapPolicy::Complete));
        assert!("half".parse::<OverlapPolicy>().is_err());
    }

    #[test]
    fn test_live_schema_is_case_insensitive() {
        let live = live(&["Serie"]);
        let column = ColumnRef {
            table: "T".to_string(),
            column: "SERIE".to_string(),
        };
        assert!(live.contains(&column));
        assert!(live.columns("t").unwrap().contains("serie"));
    }

    #[test]
    fn test_classify_partial_overlap_reports_missing() {
        let migrator = Migrator::with_builtin_catalog(".");
        let reconciler = Reconciler::new(&migrator);
        let migration =
            MigrationDefinition::new("001_ab", "a and b").add_columns("t", &[("A", "TEXT"), ("B", "TEXT")]);

        let inferred = reconciler.classify(&migration, &live(&["A"])).unwrap();
        assert_eq!(inferred.present, vec!["A"]);
        assert_eq!(inferred.missing, vec!["B"]);
        assert!(inferred.is_partial());

        let strict = reconciler.with_policy(OverlapPolicy::Complete);
        assert!(strict.classify(&migration, &live(&["A"])).is_none());
    }

    #[test]
    fn test_classify_statement_without_metadata_must_execute() {
        let migrator = Migrator::with_builtin_catalog(".");
        let reconciler = Reconciler::new(&migrator);
        let migration = MigrationDefinition::new("001_idx", "index")
            .step(MigrationStep::statement("CREATE INDEX idx_t_a ON t(A)"));

        assert!(reconciler.classify(&migration, &live(&["A"])).is_none());
    }
}
