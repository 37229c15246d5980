//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration or storage file.
	#[error("I/O error reading {}: {error}", path.display())]
	Read {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or an unknown key.
	#[error("invalid config {}: {error}", path.as_deref().map_or_else(|| "<inline>".into(), |p| p.display().to_string()))]
	Parse {
		/// File being parsed, if any.
		path: Option<PathBuf>,
		/// The underlying parse error.
		error: toml::de::Error,
	},

	/// A value parsed but is out of range.
	#[error("invalid value for {key}: {reason}")]
	Invalid {
		/// Dotted key, e.g. `omnibox.hits_per_page`.
		key: &'static str,
		/// What was wrong with it.
		reason: String,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
