//! Error types for configuration operations.

use bytebeat_core::ConfigurationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or applying a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Settings that the engine cannot run with
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_wraps_core_error() {
        let err: ConfigError = ConfigurationError::InvalidUndersample(3).into();
        assert!(err.to_string().starts_with("invalid configuration:"));
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn read_file_names_path() {
        let err = ConfigError::read_file(
            "/etc/bytebeat.toml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/etc/bytebeat.toml"));
    }
}
