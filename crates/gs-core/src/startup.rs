//! Schema checks run once when the application starts.
//!
//! A migration problem must not keep the application from starting, so
//! nothing here returns an error: failures are logged and reported as "no
//! changes".

use crate::db::DatabaseManager;
use crate::settings::{Settings, StartupMode};
use gs_local_db::Environment;
use tracing::{debug, error, info};

/// Bring `environment` up to date according to `settings`.
///
/// Returns whether any migration was executed or newly recorded. A failed
/// run returns `false` even when it got partway: migrations recorded or
/// applied before the failing one stay in place, so callers that care must
/// read [`DatabaseManager::status`]. `verbose` promotes per-migration
/// progress from debug to info level.
pub fn run_on_startup(settings: &Settings, environment: Environment, verbose: bool) -> bool {
    let manager = DatabaseManager::with_root(&settings.root);
    match run(&manager, settings, environment, verbose) {
        Ok(changed) => changed,
        Err(e) => {
            error!(%environment, error = %e, "Database migration check failed, continuing startup");
            false
        }
    }
}

fn run(
    manager: &DatabaseManager,
    settings: &Settings,
    environment: Environment,
    verbose: bool,
) -> crate::Result<bool> {
    if verbose {
        info!(%environment, mode = %settings.startup_mode, "Checking database migrations");
    } else {
        debug!(%environment, mode = %settings.startup_mode, "Checking database migrations");
    }

    if settings.create_base_tables {
        manager.initialize(environment)?;
    }

    let changed = match settings.startup_mode {
        StartupMode::Strict => {
            let applied = manager.migrate(environment)?;
            log_versions(verbose, "Migration applied at startup", &applied);
            !applied.is_empty()
        }
        StartupMode::Reconcile => {
            let report = manager.reconcile(environment, settings.overlap_policy)?;
            let inferred: Vec<String> = report.inferred.iter().map(|m| m.version.clone()).collect();
            log_versions(verbose, "Migration inferred from live schema", &inferred);
            log_versions(verbose, "Migration applied at startup", &report.executed);
            report.changed()
        }
    };

    if verbose {
        if changed {
            info!(%environment, "Database migrations applied");
        } else {
            info!(%environment, "Database up to date, no migration needed");
        }
    }
    Ok(changed)
}

fn log_versions(verbose: bool, message: &str, versions: &[String]) {
    for version in versions {
        if verbose {
            info!(%version, "{}", message);
        } else {
            debug!(%version, "{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_startup_applies_then_settles() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::default().with_root(temp_dir.path());

        assert!(run_on_startup(&settings, Environment::Test, true));
        assert!(!run_on_startup(&settings, Environment::Test, false));

        let status = DatabaseManager::with_root(temp_dir.path())
            .status(Environment::Test)
            .unwrap();
        assert!(status.is_up_to_date());
    }

    #[test]
    fn test_startup_strict_mode() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::default()
            .with_root(temp_dir.path())
            .with_startup_mode(StartupMode::Strict);

        assert!(run_on_startup(&settings, Environment::Development, false));
        let status = DatabaseManager::with_root(temp_dir.path())
            .status(Environment::Development)
            .unwrap();
        assert_eq!(status.applied_count(), 4);
    }

    #[test]
    fn test_startup_swallows_storage_errors() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("data"), b"not a directory").unwrap();
        let settings = Settings::default().with_root(temp_dir.path());

        assert!(!run_on_startup(&settings, Environment::Production, true));
    }

    #[test]
    fn test_startup_swallows_migration_errors() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::default()
            .with_root(temp_dir.path())
            .with_startup_mode(StartupMode::Strict);
        // No appareils table: every ALTER TABLE fails
        settings.create_base_tables = false;

        assert!(!run_on_startup(&settings, Environment::Test, false));
    }

    #[test]
    fn test_startup_failure_keeps_earlier_progress() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::default().with_root(temp_dir.path());
        settings.create_base_tables = false;

        let manager = DatabaseManager::with_root(temp_dir.path());
        {
            let db = manager.migrator().open(Environment::Test).unwrap();
            gs_local_db::create_base_tables(db.connection()).unwrap();
            // Label alone infers 002; Serie alone is too little for 001,
            // whose ALTER TABLE then collides with it.
            db.connection()
                .execute_batch(
                    "ALTER TABLE appareils ADD COLUMN Label TEXT;
                     ALTER TABLE appareils ADD COLUMN Serie TEXT;",
                )
                .unwrap();
        }

        assert!(!run_on_startup(&settings, Environment::Test, true));

        let status = manager.status(Environment::Test).unwrap();
        let applied: Vec<&str> = status.applied().map(|e| e.version.as_str()).collect();
        assert_eq!(applied, vec!["002_add_label_field"]);
        assert_eq!(status.pending_count(), 3);
    }
}
