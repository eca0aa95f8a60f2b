//! Runtime settings resolved from the process environment.

use gs_local_db::{Environment, OverlapPolicy};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Data root holding `data/<environment>/gestia.db`.
pub const ENV_HOME: &str = "GESTIA_HOME";
/// Environment used when none is given on the command line.
pub const ENV_ENVIRONMENT: &str = "GESTIA_ENV";
/// `reconcile` or `strict`.
pub const ENV_MIGRATION_MODE: &str = "GESTIA_MIGRATION_MODE";
/// `majority` or `complete`.
pub const ENV_OVERLAP_POLICY: &str = "GESTIA_OVERLAP_POLICY";

/// Which runner the startup hook uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartupMode {
    /// Infer already-present migrations from the live schema first.
    #[default]
    Reconcile,
    /// Execute every pending migration.
    Strict,
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupMode::Reconcile => f.write_str("reconcile"),
            StartupMode::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for StartupMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reconcile" | "smart" => Ok(StartupMode::Reconcile),
            "strict" => Ok(StartupMode::Strict),
            _ => Err(crate::Error::config(format!(
                "unknown migration mode '{s}' (expected reconcile or strict)"
            ))),
        }
    }
}

/// Settings shared by the startup hook and the operator tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub environment: Environment,
    pub startup_mode: StartupMode,
    pub overlap_policy: OverlapPolicy,
    /// Create the base tables before migrating, as a fresh install needs.
    pub create_base_tables: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: gs_local_db::Database::default_root(),
            environment: Environment::default(),
            startup_mode: StartupMode::default(),
            overlap_policy: OverlapPolicy::default(),
            create_base_tables: true,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(root) = lookup(ENV_HOME).filter(|v| !v.is_empty()) {
            settings.root = PathBuf::from(root);
        }
        if let Some(env) = lookup(ENV_ENVIRONMENT).filter(|v| !v.is_empty()) {
            settings.environment = env
                .parse()
                .map_err(|e: gs_local_db::ParseEnvironmentError| crate::Error::config(e.to_string()))?;
        }
        if let Some(mode) = lookup(ENV_MIGRATION_MODE).filter(|v| !v.is_empty()) {
            settings.startup_mode = mode.parse()?;
        }
        if let Some(policy) = lookup(ENV_OVERLAP_POLICY).filter(|v| !v.is_empty()) {
            settings.overlap_policy = policy
                .parse()
                .map_err(|e: gs_local_db::ParseOverlapPolicyError| crate::Error::config(e.to_string()))?;
        }

        Ok(settings)
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_startup_mode(mut self, mode: StartupMode) -> Self {
        self.startup_mode = mode;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.startup_mode, StartupMode::Reconcile);
        assert_eq!(settings.overlap_policy, OverlapPolicy::Majority);
    }

    #[test]
    fn test_variables_override_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_HOME, "/srv/gestia"),
            (ENV_ENVIRONMENT, "production"),
            (ENV_MIGRATION_MODE, "strict"),
            (ENV_OVERLAP_POLICY, "complete"),
        ]))
        .unwrap();

        assert_eq!(settings.root, PathBuf::from("/srv/gestia"));
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.startup_mode, StartupMode::Strict);
        assert_eq!(settings.overlap_policy, OverlapPolicy::Complete);
    }

    #[test]
    fn test_empty_variables_are_ignored() {
        let settings = Settings::from_lookup(lookup(&[(ENV_ENVIRONMENT, "")])).unwrap();
        assert_eq!(settings.environment, Environment::Development);
    }

    #[test]
    fn test_invalid_variables_are_config_errors() {
        let err = Settings::from_lookup(lookup(&[(ENV_ENVIRONMENT, "staging")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));

        let err = Settings::from_lookup(lookup(&[(ENV_MIGRATION_MODE, "yolo")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));

        let err = Settings::from_lookup(lookup(&[(ENV_OVERLAP_POLICY, "most")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));
    }

    #[test]
    fn test_startup_mode_parsing() {
        assert_eq!("Strict".parse::<StartupMode>().unwrap(), StartupMode::Strict);
        assert_eq!("smart".parse::<StartupMode>().unwrap(), StartupMode::Reconcile);
    }
}
