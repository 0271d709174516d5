//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `BALLOT_BOX__*`
//! environment variables with the `config` crate, then validates the result.

use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::ConfigResult;
use super::BallotBoxConfig;

/// Environment variable prefix; nested keys use `__`, e.g. `BALLOT_BOX__DATABASE__URL`
pub const ENV_PREFIX: &str = "BALLOT_BOX";

/// Default configuration file, read when present
pub const DEFAULT_CONFIG_FILE: &str = "config/ballot-box.toml";

/// Loaded and validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: BallotBoxConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from the default file (if it exists) and the process environment
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit file, which must exist, or from the default file
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment map instead of the process environment
    ///
    /// Keeps tests independent of global environment variables.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env.map(|vars| vars.into_iter().collect()));

        let config: BallotBoxConfig = Config::builder()
            .add_source(Config::try_from(&BallotBoxConfig::default())?)
            .add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        let source = file.exists().then_some(file);
        debug!(
            environment = %config.environment,
            source = ?source,
            "Configuration loaded"
        );

        Ok(Self { config, source })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BallotBoxConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn into_config(self) -> BallotBoxConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineEnding;
    use std::io::Write;

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            environment = "test"

            [session]
            grace_period_seconds = 1

            [protocol]
            line_ending = "crlf"
            "#
        )
        .unwrap();

        let manager = ConfigManager::load_with_env(Some(file.path()), Some(HashMap::new())).unwrap();
        let config = manager.config();

        assert_eq!(config.environment, "test");
        assert_eq!(config.session.grace_period_seconds, 1);
        assert_eq!(config.protocol.line_ending, LineEnding::CrLf);
        assert_eq!(config.protocol.verification_letters, 2);
        assert_eq!(manager.source(), Some(file.path()));
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = HashMap::from([
            (
                "BALLOT_BOX__DATABASE__URL".to_string(),
                "postgresql://override/db".to_string(),
            ),
            (
                "BALLOT_BOX__PROTOCOL__VERIFICATION_LETTERS".to_string(),
                "3".to_string(),
            ),
        ]);

        let config = ConfigManager::load_with_env(None, Some(env))
            .unwrap()
            .into_config();

        assert_eq!(config.database.url, "postgresql://override/db");
        assert_eq!(config.protocol.verification_letters, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigManager::load_with_env(
            Some(Path::new("/nonexistent/ballot-box.toml")),
            Some(HashMap::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let env = HashMap::from([(
            "BALLOT_BOX__DATABASE__MAX_CONNECTIONS".to_string(),
            "0".to_string(),
        )]);

        let result = ConfigManager::load_with_env(None, Some(env));
        assert!(result.is_err());
    }
}
