//! The static, ordered list of schema migrations.
//!
//! Every step carries its SQL together with structured metadata naming the
//! column it adds, so the reconciler never has to read column names back out
//! of statement text.

use crate::schema::{appareils, TABLE_APPAREILS};
use serde::Serialize;

/// A column on a specific table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// One schema-altering statement of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub sql: String,
    /// The column this statement adds, when it is an add-column operation.
    pub adds_column: Option<ColumnRef>,
}

impl MigrationStep {
    /// `ALTER TABLE <table> ADD COLUMN <column> <declaration>`.
    pub fn add_column(table: &str, column: &str, declaration: &str) -> Self {
        Self {
            sql: format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"),
            adds_column: Some(ColumnRef {
                table: table.to_string(),
                column: column.to_string(),
            }),
        }
    }

    /// Any other statement. It adds no column the reconciler can check for.
    pub fn statement<S: Into<String>>(sql: S) -> Self {
        Self {
            sql: sql.into(),
            adds_column: None,
        }
    }
}

/// A named unit of schema change, applied at most once per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    pub version: String,
    pub description: String,
    pub steps: Vec<MigrationStep>,
}

impl MigrationDefinition {
    pub fn new<V: Into<String>, D: Into<String>>(version: V, description: D) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append one add-column step per `(column, declaration)` pair on `table`.
    pub fn add_columns(mut self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.steps.extend(
            columns
                .iter()
                .map(|(column, declaration)| MigrationStep::add_column(table, column, declaration)),
        );
        self
    }

    /// Columns added by this migration, in step order.
    pub fn added_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.steps.iter().filter_map(|step| step.adds_column.as_ref())
    }
}

/// The developer-authored, append-only list of migrations.
#[derive(Debug, Clone)]
pub struct Catalog {
    migrations: Vec<MigrationDefinition>,
}

impl Catalog {
    /// Build a catalog, rejecting empty, duplicate or out-of-order versions.
    pub fn new(migrations: Vec<MigrationDefinition>) -> crate::Result<Self> {
        for migration in &migrations {
            if migration.version.trim().is_empty() {
                return Err(crate::Error::invalid_catalog("empty migration version"));
            }
        }
        for pair in migrations.windows(2) {
            if pair[0].version >= pair[1].version {
                return Err(crate::Error::invalid_catalog(format!(
                    "version {} must sort after {}",
                    pair[1].version, pair[0].version
                )));
            }
        }
        Ok(Self { migrations })
    }

    /// The GESTIA migrations shipped with this build.
    pub fn builtin() -> Self {
        Self {
            migrations: vec![
                MigrationDefinition::new(
                    "001_add_samsung_fields",
                    "Ajout des champs pour références Samsung",
                )
                .add_columns(
                    TABLE_APPAREILS,
                    &[
                        (appareils::SERIE, "TEXT"),
                        (appareils::CAPACITE, "TEXT"),
                        (appareils::TECHNOLOGIE, "TEXT"),
                        (appareils::VARIANTE, "TEXT"),
                        (appareils::REFERENCE_COMPLETE, "TEXT"),
                    ],
                ),
                MigrationDefinition::new(
                    "002_add_label_field",
                    "Ajout du champ Label pour les fonctionnalités marketing",
                )
                .add_columns(TABLE_APPAREILS, &[(appareils::LABEL, "TEXT")]),
                MigrationDefinition::new(
                    "003_add_test_diagnostic_fields",
                    "Ajout des champs pour tests et diagnostics",
                )
                .add_columns(
                    TABLE_APPAREILS,
                    &[
                        (appareils::ACTIONS_A_FAIRE, "TEXT"),
                        (appareils::SOUCIS_MACHINE, "TEXT"),
                    ],
                ),
                MigrationDefinition::new(
                    "004_add_numero_serie_field",
                    "Ajout du champ NumeroSerie obligatoire",
                )
                .add_columns(TABLE_APPAREILS, &[(appareils::NUMERO_SERIE, "TEXT")]),
            ],
        }
    }

    /// All migrations in application order.
    pub fn all(&self) -> &[MigrationDefinition] {
        &self.migrations
    }

    /// Look up a migration by version.
    pub fn get(&self, version: &str) -> Option<&MigrationDefinition> {
        self.migrations.iter().find(|m| m.version == version)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
