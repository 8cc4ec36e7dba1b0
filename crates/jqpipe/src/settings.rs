//! Settings file for jqpipe.
//!
//! A small YAML file naming the query program and staging directory:
//!
//! ```yaml
//! program: jq
//! staging-dir: /run/user/1000/jqpipe
//! ```
//!
//! Missing keys fall back to their defaults.

use crate::error::{Error, Result};
use crate::runner::DEFAULT_PROGRAM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Conventional settings file name.
pub const SETTINGS_FILE_NAME: &str = "jqpipe.yaml";

/// Runner settings loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Query program to run, looked up on the search path.
    pub program: String,

    /// Directory for staged pipes; the platform temp directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            staging_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Settings`] if it is not valid YAML for this structure.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Settings(format!("{}: {e}", path.display())))
    }

    /// Save settings to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] on serialization failure and
    /// [`Error::Io`] if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Settings(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_preserves_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        let settings = Settings {
            program: "gojq".to_string(),
            staging_dir: Some(temp.path().join("pipes")),
        };

        settings.save(&path).await.unwrap();
        let loaded = Settings::load(&path).await.unwrap();

        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn missing_keys_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        tokio::fs::write(&path, "staging-dir: /var/tmp/jq\n")
            .await
            .unwrap();

        let loaded = Settings::load(&path).await.unwrap();

        assert_eq!(loaded.program, "jq");
        assert_eq!(loaded.staging_dir, Some(PathBuf::from("/var/tmp/jq")));
    }

    #[tokio::test]
    async fn invalid_yaml_is_a_settings_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        tokio::fs::write(&path, "program: [unclosed\n").await.unwrap();

        let err = Settings::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let temp = TempDir::new().unwrap();
        let err = Settings::load(&temp.path().join("absent.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
