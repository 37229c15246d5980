//! Request/reply correlation over the backend pipe.
//!
//! One [`Channel`] owns one duplex pipe to the backend process. Callers issue
//! typed requests and get a [`ReplyHandle`] back immediately; a single pump
//! task assigns request ids, writes frames, and routes each reply to the
//! handle whose id it carries. Replies may arrive in any order.
//!
//! Every request resolves exactly once to an [`Outcome`]:
//! * `Success` when the backend answered with a decodable payload
//! * `Failed` when it answered with `error: true` or an unusable payload
//! * `Abandoned` on disconnect or when the request deadline expires

#![warn(missing_docs)]

use std::path::PathBuf;

mod channel;
mod io;
pub mod launcher;
mod outcome;
pub mod pending;

pub use channel::{Channel, ChannelOptions, ChannelState, DEFAULT_REQUEST_TIMEOUT};
pub use launcher::{BackendCommand, HostManifest, default_manifest_dirs, resolve_backend, spawn_backend};
pub use outcome::{Abandon, Ack, Failure, Outcome, ReplyHandle};
pub use pending::{IdAllocator, PendingTable};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while opening a channel.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The backend process could not be started.
	#[error("failed to spawn backend {program}: {reason}")]
	Spawn {
		/// Executable that was attempted.
		program: String,
		/// Underlying failure.
		reason: String,
	},
	/// A host manifest was found but is unusable.
	#[error("invalid host manifest {}: {reason}", path.display())]
	Manifest {
		/// Manifest file.
		path: PathBuf,
		/// What was wrong with it.
		reason: String,
	},
	/// No host manifest exists for the application id.
	#[error("no host manifest for {app_id} in {} directories", searched.len())]
	ManifestNotFound {
		/// Application id being resolved.
		app_id: String,
		/// Directories that were searched.
		searched: Vec<PathBuf>,
	},
}

#[cfg(test)]
mod tests;
