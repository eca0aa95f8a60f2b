//! Named deployment targets and their database locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A deployment target with its own isolated database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// All environments, in promotion order.
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Test,
        Environment::Production,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    /// Location of this environment's database under `root`.
    ///
    /// Layout: `<root>/data/<environment>/gestia.db`.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join("data")
            .join(self.as_str())
            .join(crate::schema::DATABASE_FILE_NAME)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown environment '{name}' (expected development, test or production)")]
pub struct ParseEnvironmentError {
    pub name: String,
}

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ParseEnvironmentError {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_environment_names() {
        assert_eq!("development".parse(), Ok(Environment::Development));
        assert_eq!("Test".parse(), Ok(Environment::Test));
        assert_eq!("PRODUCTION".parse(), Ok(Environment::Production));
        assert_eq!("dev".parse(), Ok(Environment::Development));
        assert_eq!("prod".parse(), Ok(Environment::Production));
    }

    #[test]
    fn test_parse_environment_invalid() {
        let err = "staging".parse::<Environment>().unwrap_err();
        assert_eq!(err.name, "staging");
        assert!("".parse::<Environment>().is_err());
    }

    #[test]
    fn test_database_paths_are_isolated() {
        let root = Path::new("/srv/gestia");
        assert_eq!(
            Environment::Production.database_path(root),
            PathBuf::from("/srv/gestia/data/production/gestia.db")
        );

        let paths: std::collections::HashSet<_> =
            Environment::ALL.iter().map(|env| env.database_path(root)).collect();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for env in Environment::ALL {
            assert_eq!(env.to_string().parse(), Ok(env));
        }
    }
}
