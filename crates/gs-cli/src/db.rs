use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use gs_core::{DatabaseManager, Environment, MigrationStatus, OverlapPolicy, Settings};
use gs_local_db::{Catalog, MigrationDefinition, MigrationState, MigrationStep, TABLE_APPAREILS};

/// Schema migration commands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Apply every pending migration in catalog order
    Migrate(EnvArgs),
    /// Show applied and pending migrations
    Status(StatusArgs),
    /// Record a migration as applied without running it
    MarkApplied(MarkAppliedArgs),
    /// Infer already-present migrations from the live schema, then migrate
    Reconcile(ReconcileArgs),
    /// Create the base tables of a fresh environment
    Init(EnvArgs),
    /// Print a new catalog entry to paste into the built-in catalog
    Create(CreateArgs),
}

/// Target environment selection
#[derive(Args)]
pub struct EnvArgs {
    /// Target environment (development, test, production; default: $GESTIA_ENV)
    #[arg(long = "env", value_name = "ENV")]
    pub env: Option<Environment>,
}

impl EnvArgs {
    /// The explicit environment, or the one from settings.
    pub fn resolve(&self, settings: &Settings) -> Environment {
        self.env.unwrap_or(settings.environment)
    }
}

/// Arguments for the status report
#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: EnvArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for marking a migration as applied
#[derive(Args)]
pub struct MarkAppliedArgs {
    #[command(flatten)]
    pub target: EnvArgs,

    /// Migration version, e.g. 004_add_numero_serie_field
    #[arg(value_name = "VERSION")]
    pub version: String,
}

/// Arguments for reconciliation
#[derive(Args)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub target: EnvArgs,

    /// Only skip a migration when all of its columns already exist
    #[arg(long)]
    pub require_complete: bool,
}

impl ReconcileArgs {
    fn policy(&self, settings: &Settings) -> OverlapPolicy {
        if self.require_complete {
            OverlapPolicy::Complete
        } else {
            settings.overlap_policy
        }
    }
}

/// Arguments for drafting a new migration
#[derive(Args)]
pub struct CreateArgs {
    /// Migration version, e.g. 005_add_prix_field
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Human-readable description
    #[arg(value_name = "DESCRIPTION")]
    pub description: String,

    /// Table the columns are added to
    #[arg(long, default_value = TABLE_APPAREILS)]
    pub table: String,

    /// Column to add, as NAME:DECLARATION (repeatable)
    #[arg(long = "column", value_name = "NAME:DECL", value_parser = parse_column)]
    pub columns: Vec<(String, String)>,

    /// Additional SQL statement (repeatable)
    #[arg(long = "sql", value_name = "STATEMENT")]
    pub statements: Vec<String>,
}

fn parse_column(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once(':') {
        Some((name, declaration)) if !name.trim().is_empty() && !declaration.trim().is_empty() => {
            Ok((name.trim().to_string(), declaration.trim().to_string()))
        }
        _ => Err(format!("expected NAME:DECLARATION, got '{value}'")),
    }
}

impl CreateArgs {
    /// The migration these arguments describe.
    pub fn definition(&self) -> MigrationDefinition {
        let columns: Vec<(&str, &str)> = self
            .columns
            .iter()
            .map(|(name, declaration)| (name.as_str(), declaration.as_str()))
            .collect();
        self.statements.iter().fold(
            MigrationDefinition::new(&self.version, &self.description)
                .add_columns(&self.table, &columns),
            |definition, sql| definition.step(MigrationStep::statement(sql.as_str())),
        )
    }

    /// Check the draft against `catalog` and render it as a catalog entry.
    pub fn render(&self, catalog: &Catalog) -> Result<String> {
        if self.columns.is_empty() && self.statements.is_empty() {
            anyhow::bail!("a migration needs at least one --column or --sql");
        }
        let mut migrations = catalog.all().to_vec();
        migrations.push(self.definition());
        Catalog::new(migrations)
            .with_context(|| format!("{} cannot be appended to the catalog", self.version))?;

        let mut out = format!(
            "MigrationDefinition::new(\n    {:?},\n    {:?},\n)\n",
            self.version, self.description
        );
        if !self.columns.is_empty() {
            out.push_str(&format!(".add_columns(\n    {:?},\n    &[\n", self.table));
            for (name, declaration) in &self.columns {
                out.push_str(&format!("        ({name:?}, {declaration:?}),\n"));
            }
            out.push_str("    ],\n)\n");
        }
        for sql in &self.statements {
            out.push_str(&format!(".step(MigrationStep::statement({sql:?}))\n"));
        }
        Ok(out)
    }
}

impl DbCommands {
    /// Execute the database command
    pub fn run(self, settings: &Settings) -> Result<()> {
        let manager = DatabaseManager::with_root(&settings.root);

        match self {
            DbCommands::Migrate(args) => {
                let env = args.resolve(settings);
                let applied = manager
                    .migrate(env)
                    .with_context(|| format!("Failed to migrate the {env} database"))?;
                if applied.is_empty() {
                    println!("{env}: database up to date, no migration applied");
                } else {
                    for version in &applied {
                        println!("{env}: applied {version}");
                    }
                    println!("{env}: {} migration(s) applied", applied.len());
                }
                Ok(())
            }
            DbCommands::Status(args) => {
                let env = args.target.resolve(settings);
                let status = manager
                    .status(env)
                    .with_context(|| format!("Failed to read migration status of {env}"))?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print!("{}", render_status(&status));
                }
                Ok(())
            }
            DbCommands::MarkApplied(args) => {
                let env = args.target.resolve(settings);
                let record = manager
                    .mark_applied(env, &args.version)
                    .with_context(|| format!("Failed to mark {} as applied", args.version))?;
                println!("{env}: {} marked as applied at {}", record.version, record.applied_at);
                Ok(())
            }
            DbCommands::Reconcile(args) => {
                let env = args.target.resolve(settings);
                let report = manager
                    .reconcile(env, args.policy(settings))
                    .with_context(|| format!("Failed to reconcile the {env} database"))?;
                for inferred in &report.inferred {
                    if inferred.is_partial() {
                        println!(
                            "{env}: {} marked as applied, missing columns: {}",
                            inferred.version,
                            inferred.missing.join(", ")
                        );
                    } else {
                        println!("{env}: {} marked as applied, columns present", inferred.version);
                    }
                }
                for version in &report.executed {
                    println!("{env}: applied {version}");
                }
                if !report.changed() {
                    println!("{env}: database up to date");
                }
                Ok(())
            }
            DbCommands::Init(args) => {
                let env = args.resolve(settings);
                manager
                    .initialize(env)
                    .with_context(|| format!("Failed to initialize the {env} database"))?;
                println!("{env}: base tables ready");
                Ok(())
            }
            DbCommands::Create(args) => {
                let entry = args.render(manager.migrator().catalog())?;
                println!("Append to Catalog::builtin() in crates/gs-local-db/src/catalog.rs:\n");
                println!("{entry}");
                println!("Then run: gestia db migrate --env <ENV>");
                Ok(())
            }
        }
    }
}

/// Human-readable status report, one line per catalog entry.
pub fn render_status(status: &MigrationStatus) -> String {
    let mut out = format!("Migration status - environment: {}\n", status.environment);
    for entry in &status.entries {
        match &entry.state {
            MigrationState::Applied { applied_at } => out.push_str(&format!(
                "  [applied] {}: {} ({applied_at})\n",
                entry.version, entry.description
            )),
            MigrationState::Pending => out.push_str(&format!(
                "  [pending] {}: {}\n",
                entry.version, entry.description
            )),
        }
    }
    for record in &status.unknown_records {
        out.push_str(&format!("  [unknown] {} (not in catalog)\n", record.version));
    }
    out.push_str(&format!(
        "\n{} applied, {} pending\nDatabase: {} ({})\n",
        status.applied_count(),
        status.pending_count(),
        status.database_path.display(),
        if status.database_exists { "exists" } else { "missing" }
    ));
    out
}
