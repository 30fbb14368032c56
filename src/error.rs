//! Start-up errors for autocad-mcp.
//!
//! Drawing errors live in [`crate::cad::error`]. The types here cover what can
//! stop the server before or while it serves: a bad configuration file, a
//! runtime that cannot be built, or a broken stdio channel.

use std::path::PathBuf;

use thiserror::Error;

/// A configuration file that cannot be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {path}")]
    Missing {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Unreadable {
        /// File path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("malformed configuration file {path}")]
    Malformed {
        /// File path.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A setting is outside its allowed range.
    #[error("invalid setting host.{setting}: {reason}")]
    OutOfRange {
        /// Setting name within the `host` section.
        setting: &'static str,
        /// What the value must satisfy.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(setting: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            setting,
            reason: reason.into(),
        }
    }
}

/// Anything that ends the process with a failure status.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The async runtime could not be created.
    #[error("failed to create runtime")]
    Runtime(#[source] std::io::Error),

    /// Reading requests or writing replies failed.
    #[error("stdio transport failed")]
    Transport(#[source] std::io::Error),
}
