//! Configuration for memberry.
//!
//! Configuration is written in TOML and read from (in order):
//!
//! 1. the path given on the command line (`--config`), which must exist
//! 2. `$XDG_CONFIG_HOME/memberry/config.toml` (or the platform equivalent),
//!    silently skipped when absent
//!
//! Every key is optional:
//!
//! ```toml
//! [backend]
//! app_id = "com.shemanaev.memberry"
//! # command = "/opt/memberry/host"   # bypasses manifest lookup
//! args = []
//! manifest_dirs = []
//! request_timeout_ms = 30000
//!
//! [omnibox]
//! debounce_ms = 700
//! hits_per_page = 6
//! browser = "chrome"                 # or "firefox"
//! date_format = "%d.%m.%y"
//!
//! [storage]
//! # blacklist_file = "~/.config/memberry/blacklist.txt"
//! ```
//!
//! Unknown keys are rejected so typos surface at start-up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;

pub use error::{ConfigError, Result};

/// Native messaging application id of the backend.
pub const DEFAULT_APP_ID: &str = "com.shemanaev.memberry";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// How the backend is located and talked to.
	pub backend: BackendConfig,
	/// Search-as-you-type behaviour.
	pub omnibox: OmniboxConfig,
	/// Locally persisted settings.
	pub storage: StorageConfig,
}

/// `[backend]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
	/// Application id used to find the host manifest.
	pub app_id: String,
	/// Explicit backend executable; skips manifest lookup.
	pub command: Option<PathBuf>,
	/// Arguments passed to the backend.
	pub args: Vec<String>,
	/// Extra manifest directories, searched before the platform defaults.
	pub manifest_dirs: Vec<PathBuf>,
	/// Per-request deadline in milliseconds.
	pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			app_id: DEFAULT_APP_ID.to_string(),
			command: None,
			args: Vec::new(),
			manifest_dirs: Vec::new(),
			request_timeout_ms: 30_000,
		}
	}
}

impl BackendConfig {
	/// Per-request deadline.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

/// Which browser renders the suggestions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
	/// Chromium family: markup in descriptions, urls shown.
	#[default]
	Chrome,
	/// Firefox: plain descriptions only.
	Firefox,
}

/// `[omnibox]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OmniboxConfig {
	/// Quiet period after the last keystroke before searching.
	pub debounce_ms: u64,
	/// Hits requested per search.
	pub hits_per_page: u32,
	/// Suggestion flavour.
	pub browser: Browser,
	/// `strftime` format for the visit date.
	pub date_format: String,
}

impl Default for OmniboxConfig {
	fn default() -> Self {
		Self {
			debounce_ms: 700,
			hits_per_page: 6,
			browser: Browser::Chrome,
			date_format: "%d.%m.%y".to_string(),
		}
	}
}

impl OmniboxConfig {
	/// Debounce delay.
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
	/// Newline-delimited blacklist patterns.
	pub blacklist_file: Option<PathBuf>,
}

impl Config {
	/// Parses configuration from a TOML string.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
	/// [`ConfigError::Invalid`] for out-of-range values.
	pub fn parse(text: &str) -> Result<Self> {
		Self::parse_at(text, None)
	}

	fn parse_at(text: &str, path: Option<&Path>) -> Result<Self> {
		let config: Self = toml::from_str(text).map_err(|error| ConfigError::Parse {
			path: path.map(Path::to_path_buf),
			error,
		})?;
		config.validate()?;
		Ok(config)
	}

	/// Loads configuration from `path`, or from the default location.
	///
	/// An explicit path must exist. A missing default file yields
	/// [`Config::default`].
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Read`] when the file cannot be read, plus
	/// anything [`Config::parse`] returns.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let (path, required) = match path {
			Some(path) => (path.to_path_buf(), true),
			None => match default_path() {
				Some(path) => (path, false),
				None => {
					tracing::debug!("config.no_config_dir");
					return Ok(Self::default());
				}
			},
		};

		match std::fs::read_to_string(&path) {
			Ok(text) => {
				let config = Self::parse_at(&text, Some(&path))?;
				tracing::debug!(path = %path.display(), "config.loaded");
				Ok(config)
			}
			Err(error) if !required && error.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "config.defaults");
				Ok(Self::default())
			}
			Err(error) => Err(ConfigError::Read { path, error }),
		}
	}

	/// Reads the persisted blacklist text.
	///
	/// Returns `None` when no file is configured or the file does not exist yet.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Read`] for any other I/O failure.
	pub fn read_blacklist(&self) -> Result<Option<String>> {
		let Some(path) = &self.storage.blacklist_file else {
			return Ok(None);
		};
		match std::fs::read_to_string(path) {
			Ok(text) => Ok(Some(text)),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "config.blacklist_missing");
				Ok(None)
			}
			Err(error) => Err(ConfigError::Read {
				path: path.clone(),
				error,
			}),
		}
	}

	fn validate(&self) -> Result<()> {
		if !is_valid_app_id(&self.backend.app_id) {
			return Err(ConfigError::Invalid {
				key: "backend.app_id",
				reason: format!("{:?} is not a native messaging host name", self.backend.app_id),
			});
		}
		if self.backend.request_timeout_ms == 0 {
			return Err(ConfigError::Invalid {
				key: "backend.request_timeout_ms",
				reason: "must be positive".into(),
			});
		}
		if self.omnibox.hits_per_page == 0 {
			return Err(ConfigError::Invalid {
				key: "omnibox.hits_per_page",
				reason: "must be positive".into(),
			});
		}
		Ok(())
	}
}

/// Default configuration file location.
pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("memberry").join("config.toml"))
}

/// Host names are dot-separated segments of `[a-z0-9_]`.
fn is_valid_app_id(id: &str) -> bool {
	!id.is_empty()
		&& id.split('.').all(|segment| {
			!segment.is_empty()
				&& segment
					.bytes()
					.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
		})
}
