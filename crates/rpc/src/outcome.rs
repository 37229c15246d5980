//! Per-request results and the future callers await them with.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use memberry_protocol::RequestKind;
use pin_project_lite::pin_project;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

/// Final result of one request. Every request resolves exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
	/// The backend answered and the payload decoded.
	Success(T),
	/// The backend answered, but not with a usable payload.
	Failed(Failure),
	/// No answer will ever arrive.
	Abandoned(Abandon),
}

impl<T> Outcome<T> {
	/// Returns the payload of a successful reply.
	pub fn success(self) -> Option<T> {
		match self {
			Self::Success(value) => Some(value),
			Self::Failed(_) | Self::Abandoned(_) => None,
		}
	}

	/// Returns true for [`Outcome::Success`].
	pub const fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Maps the success payload.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
		match self {
			Self::Success(value) => Outcome::Success(f(value)),
			Self::Failed(failure) => Outcome::Failed(failure),
			Self::Abandoned(reason) => Outcome::Abandoned(reason),
		}
	}
}

/// Why an answered request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
	/// The reply carried `error: true`.
	#[error("backend reported an error: {0}")]
	Backend(JsonValue),
	/// The reply payload did not match the expected shape.
	#[error("reply payload did not decode: {0}")]
	Decode(String),
	/// The request could not be encoded, so it was never sent.
	#[error("request could not be encoded: {0}")]
	Encode(String),
	/// The request was rejected before reaching the pipe.
	#[error("invalid request: {0}")]
	Invalid(String),
}

/// Why a request will never be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Abandon {
	/// The pipe closed while the request was pending.
	#[error("backend disconnected")]
	Disconnected,
	/// The per-request deadline expired first.
	#[error("backend did not answer in time")]
	TimedOut,
	/// The channel was already closed when the request was issued.
	#[error("channel closed")]
	Closed,
}

/// Payload for requests whose reply carries no information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl<'de> Deserialize<'de> for Ack {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		IgnoredAny::deserialize(d)?;
		Ok(Self)
	}
}

pin_project! {
	/// Future resolving to the [`Outcome`] of one request.
	///
	/// Dropping the handle does not cancel the request; its pending entry is
	/// reclaimed by the reply, the deadline, or a disconnect.
	#[must_use = "the outcome is lost unless the handle is awaited"]
	pub struct ReplyHandle<T> {
		#[pin]
		rx: oneshot::Receiver<Outcome<JsonValue>>,
		kind: RequestKind,
		_payload: PhantomData<fn() -> T>,
	}
}

impl<T> fmt::Debug for ReplyHandle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReplyHandle")
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

impl<T> ReplyHandle<T> {
	pub(crate) fn new(kind: RequestKind, rx: oneshot::Receiver<Outcome<JsonValue>>) -> Self {
		Self {
			rx,
			kind,
			_payload: PhantomData,
		}
	}

	/// Builds a handle that is already resolved.
	pub(crate) fn resolved(kind: RequestKind, outcome: Outcome<JsonValue>) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(outcome);
		Self::new(kind, rx)
	}

	/// Kind of the request this handle belongs to.
	pub const fn kind(&self) -> RequestKind {
		self.kind
	}
}

impl<T: DeserializeOwned> Future for ReplyHandle<T> {
	type Output = Outcome<T>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let raw = match ready!(this.rx.poll(cx)) {
			Ok(outcome) => outcome,
			// The pump went away without resolving us.
			Err(_) => Outcome::Abandoned(Abandon::Disconnected),
		};

		Poll::Ready(match raw {
			Outcome::Success(data) => match serde_json::from_value(data) {
				Ok(value) => Outcome::Success(value),
				Err(e) => {
					tracing::warn!(kind = %this.kind, error = %e, "rpc.reply_decode_failed");
					Outcome::Failed(Failure::Decode(e.to_string()))
				}
			},
			Outcome::Failed(failure) => Outcome::Failed(failure),
			Outcome::Abandoned(reason) => Outcome::Abandoned(reason),
		})
	}
}
