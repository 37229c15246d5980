//! How the controller obtains a backend channel.

use std::path::PathBuf;

use memberry_config::BackendConfig;
use memberry_rpc::{BackendCommand, Channel, ChannelOptions, default_manifest_dirs, resolve_backend, spawn_backend};

/// Opens backend channels on demand.
pub trait Connect: Send {
	/// Opens a fresh channel.
	///
	/// # Errors
	///
	/// Whatever prevented the backend from being reached.
	fn connect(&mut self) -> memberry_rpc::Result<Channel>;
}

impl<F> Connect for F
where
	F: FnMut() -> memberry_rpc::Result<Channel> + Send,
{
	fn connect(&mut self) -> memberry_rpc::Result<Channel> {
		self()
	}
}

/// Spawns the backend process described by the `[backend]` config section.
#[derive(Debug, Clone)]
pub struct SpawnBackend {
	app_id: String,
	command: Option<PathBuf>,
	args: Vec<String>,
	manifest_dirs: Vec<PathBuf>,
	options: ChannelOptions,
}

impl SpawnBackend {
	/// Builds a connector from configuration.
	pub fn from_config(config: &BackendConfig) -> Self {
		Self {
			app_id: config.app_id.clone(),
			command: config.command.clone(),
			args: config.args.clone(),
			manifest_dirs: config.manifest_dirs.clone(),
			options: ChannelOptions {
				request_timeout: config.request_timeout(),
			},
		}
	}

	/// Resolves the executable: an explicit command wins, then the host manifest.
	///
	/// # Errors
	///
	/// Returns the manifest lookup error when no command is configured and
	/// no usable manifest exists.
	pub fn resolve(&self) -> memberry_rpc::Result<BackendCommand> {
		let program = match &self.command {
			Some(program) => program.clone(),
			None => {
				let mut dirs = self.manifest_dirs.clone();
				dirs.extend(default_manifest_dirs());
				resolve_backend(&self.app_id, &dirs)?
			}
		};
		Ok(BackendCommand::new(program).args(self.args.iter().cloned()))
	}
}

impl Connect for SpawnBackend {
	fn connect(&mut self) -> memberry_rpc::Result<Channel> {
		let command = self.resolve()?;
		spawn_backend(&command, self.options)
	}
}
