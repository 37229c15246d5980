//! Length-prefixed JSON framing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Largest body the extension side may send to the backend (1 MiB).
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

/// Largest body accepted from the backend (64 MiB).
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Serializes `msg` into a complete frame: length prefix followed by the JSON body.
///
/// # Errors
///
/// - [`Error::Json`] when `msg` cannot be serialized.
/// - [`Error::FrameTooLarge`] when the body exceeds [`MAX_OUTBOUND_FRAME`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
	let body = serde_json::to_vec(msg)?;
	if body.len() > MAX_OUTBOUND_FRAME {
		return Err(Error::FrameTooLarge {
			len: body.len(),
			limit: MAX_OUTBOUND_FRAME,
		});
	}

	let mut frame = Vec::with_capacity(body.len() + 4);
	frame.extend_from_slice(&(body.len() as u32).to_ne_bytes());
	frame.extend_from_slice(&body);
	Ok(frame)
}

/// Decodes a frame body previously returned by [`read_frame`].
///
/// # Errors
///
/// Returns [`Error::Json`] when the body is not a valid `T`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
	Ok(serde_json::from_slice(body)?)
}

/// Writes one frame and flushes the output.
///
/// Nothing is written when encoding fails, so the stream stays aligned.
///
/// # Errors
///
/// Propagates [`encode`] errors and I/O errors from `output`.
pub async fn write_frame<T: Serialize>(output: &mut (impl AsyncWrite + Unpin), msg: &T) -> Result<()> {
	let frame = encode(msg)?;
	output.write_all(&frame).await?;
	output.flush().await?;
	Ok(())
}

/// Reads one frame body.
///
/// Returns `Ok(None)` when the peer closed the pipe before a new length
/// prefix was complete.
///
/// # Errors
///
/// - [`Error::FrameTooLarge`] when the announced length exceeds [`MAX_INBOUND_FRAME`].
/// - [`Error::Io`] on read failures, including EOF in the middle of a body.
pub async fn read_frame(input: &mut (impl AsyncRead + Unpin)) -> Result<Option<Vec<u8>>> {
	let mut prefix = [0u8; 4];
	match input.read_exact(&mut prefix).await {
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e.into()),
	}

	let len = u32::from_ne_bytes(prefix) as usize;
	if len > MAX_INBOUND_FRAME {
		return Err(Error::FrameTooLarge {
			len,
			limit: MAX_INBOUND_FRAME,
		});
	}

	let mut body = vec![0u8; len];
	input.read_exact(&mut body).await?;
	Ok(Some(body))
}
