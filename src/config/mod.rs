//! Configuration file loading and parsing.
//!
//! # Configuration File Locations
//!
//! 1. Path given as the first CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.autocad-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.autocad-mcp\config.json`
//!
//! An explicit path must exist. A missing file at the default location means
//! the built-in defaults are used.
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{Backend, Config, HostConfig, LoggingConfig, MAX_SETTLE_DELAY_MS};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.autocad-mcp/`
/// - **Windows:** `%USERPROFILE%\.autocad-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".autocad-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, the default location is tried and defaults are used
/// when nothing is there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicit configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - A setting is out of range
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Missing {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Unreadable {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_path_is_in_home() {
        let path = default_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains(".autocad-mcp"));
        assert!(path.to_string_lossy().ends_with("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("missing.json")));
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn loads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "host": {{ "backend": "memory", "settle_delay_ms": 0 }} }}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.host.backend, Backend::Memory);
        assert_eq!(config.host.settle_delay_ms, 0);
    }

    #[test]
    fn example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/example-config.json");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.host.backend, Backend::Detached);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = load_config(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn out_of_range_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "host": {{ "scan_pause_every": 0 }} }}"#).unwrap();
        let result = load_config(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }
}
