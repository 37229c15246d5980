//! Wire types and framing for the memberry backend pipe.
//!
//! The backend is reached through the browser "native messaging" convention:
//! every message is a UTF-8 JSON document preceded by its byte length as a
//! 32-bit unsigned integer in native byte order.
//!
//! * [`types`]: requests, replies and their type-specific payloads
//! * [`codec`]: frame reading and writing over tokio I/O

#![warn(missing_docs)]

use std::io;

pub mod codec;
pub mod types;

pub use codec::{MAX_INBOUND_FRAME, MAX_OUTBOUND_FRAME, decode, encode, read_frame, write_frame};
pub use types::{
	CheckStatus, Document, Hit, Reply, Request, RequestData, RequestId, RequestKind, SearchQuery,
	SearchResults, UrlTarget, VersionInfo, VersionProbe,
};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while framing or decoding messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Input/output errors from the underlying pipe.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// A frame body was not valid JSON for the expected type.
	#[error("deserialization failed: {0}")]
	Json(#[from] serde_json::Error),
	/// A frame exceeded the size accepted in its direction.
	#[error("frame of {len} bytes exceeds the {limit} byte limit")]
	FrameTooLarge {
		/// Encoded body length.
		len: usize,
		/// Limit that was exceeded.
		limit: usize,
	},
}
