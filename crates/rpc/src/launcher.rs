//! Locating and spawning the backend process.
//!
//! Browsers locate native messaging hosts through a JSON manifest named after
//! the application id. The same manifests are honoured here so the backend
//! installed for the browser is the one that gets spawned.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::channel::{Channel, ChannelOptions};
use crate::{Error, Result};

/// Native messaging host manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct HostManifest {
	/// Application id; must equal the id being resolved.
	pub name: String,
	/// Human-readable description.
	#[serde(default)]
	pub description: String,
	/// Backend executable.
	pub path: PathBuf,
	/// Transport kind; only `stdio` is supported.
	#[serde(rename = "type")]
	pub kind: String,
}

/// Fully resolved backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
	/// Executable to spawn.
	pub program: PathBuf,
	/// Arguments passed to it.
	pub args: Vec<String>,
}

impl BackendCommand {
	/// Creates a command without arguments.
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
		}
	}

	/// Sets the arguments.
	pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.args = args.into_iter().map(Into::into).collect();
		self
	}
}

/// Per-user manifest directories used by Chromium-family browsers and Firefox.
pub fn default_manifest_dirs() -> Vec<PathBuf> {
	let mut dirs = Vec::new();
	if let Some(config) = dirs::config_dir() {
		for browser in ["google-chrome", "chromium", "BraveSoftware/Brave-Browser"] {
			dirs.push(config.join(browser).join("NativeMessagingHosts"));
		}
	}
	if let Some(home) = dirs::home_dir() {
		dirs.push(home.join(".mozilla").join("native-messaging-hosts"));
	}
	dirs
}

/// Reads and validates the manifest at `path` for `app_id`.
///
/// # Errors
///
/// Returns [`Error::Manifest`] when the file is unreadable, malformed, names a
/// different application, or declares a transport other than `stdio`.
pub fn read_manifest(path: &Path, app_id: &str) -> Result<HostManifest> {
	let manifest_err = |reason: String| Error::Manifest {
		path: path.to_path_buf(),
		reason,
	};

	let text = std::fs::read_to_string(path).map_err(|e| manifest_err(e.to_string()))?;
	let mut manifest: HostManifest = serde_json::from_str(&text).map_err(|e| manifest_err(e.to_string()))?;

	if manifest.name != app_id {
		return Err(manifest_err(format!("manifest is for {:?}", manifest.name)));
	}
	if manifest.kind != "stdio" {
		return Err(manifest_err(format!("unsupported transport {:?}", manifest.kind)));
	}
	if manifest.path.is_relative()
		&& let Some(dir) = path.parent()
	{
		manifest.path = dir.join(&manifest.path);
	}

	Ok(manifest)
}

/// Finds the backend executable for `app_id` in the first directory holding its manifest.
///
/// # Errors
///
/// - [`Error::Manifest`] when a manifest exists but is invalid.
/// - [`Error::ManifestNotFound`] when no directory holds `<app_id>.json`.
pub fn resolve_backend(app_id: &str, manifest_dirs: &[PathBuf]) -> Result<PathBuf> {
	let file_name = format!("{app_id}.json");
	for dir in manifest_dirs {
		let candidate = dir.join(&file_name);
		if candidate.is_file() {
			let manifest = read_manifest(&candidate, app_id)?;
			tracing::debug!(manifest = %candidate.display(), program = %manifest.path.display(), "rpc.manifest_resolved");
			return Ok(manifest.path);
		}
	}

	Err(Error::ManifestNotFound {
		app_id: app_id.to_string(),
		searched: manifest_dirs.to_vec(),
	})
}

/// Spawns the backend and opens a channel over its stdin/stdout.
///
/// The child is killed when the channel shuts down.
///
/// # Errors
///
/// Returns [`Error::Spawn`] when the process cannot be started or its pipes captured.
pub fn spawn_backend(command: &BackendCommand, options: ChannelOptions) -> Result<Channel> {
	let program = command.program.display().to_string();
	tracing::info!(%program, args = ?command.args, "rpc.spawning_backend");

	let mut child = Command::new(&command.program)
		.args(&command.args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.kill_on_drop(true)
		.spawn()
		.map_err(|e| Error::Spawn {
			program: program.clone(),
			reason: e.to_string(),
		})?;

	let stdin = child.stdin.take().ok_or_else(|| Error::Spawn {
		program: program.clone(),
		reason: "failed to capture stdin".into(),
	})?;
	let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
		program: program.clone(),
		reason: "failed to capture stdout".into(),
	})?;

	Ok(Channel::start(stdout, stdin, Some(child), options))
}
