//! Public handle to the backend pipe.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memberry_protocol::{
	CheckStatus, Document, RequestData, RequestKind, SearchQuery, SearchResults, UrlTarget,
	VersionInfo, VersionProbe,
};
use memberry_worker::{TaskClass, spawn};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::io::{PumpContext, run_channel_io};
use crate::outcome::{Ack, Failure, Outcome, ReplyHandle};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection state of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	/// The pipe is open and requests are being written.
	Connected,
	/// The pipe closed; every request resolves as abandoned.
	Disconnected,
}

/// Tunables for a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
	/// Deadline applied to every request.
	pub request_timeout: Duration,
}

impl Default for ChannelOptions {
	fn default() -> Self {
		Self {
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

/// A request queued for the pump.
pub(crate) struct Outbound {
	pub(crate) data: RequestData,
	pub(crate) reply: oneshot::Sender<Outcome<JsonValue>>,
}

/// Handle to one duplex pipe to the backend.
///
/// Cloning is cheap; all clones share the same pipe and pending table. The
/// pump stops when the pipe closes, when [`close`](Self::close) is called, or
/// when every clone is dropped.
#[derive(Debug, Clone)]
pub struct Channel {
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	state_rx: watch::Receiver<ChannelState>,
	pending: Arc<AtomicUsize>,
	shutdown: CancellationToken,
}

impl Channel {
	/// Builds a channel over an arbitrary reader/writer pair.
	pub fn from_io<R, W>(reader: R, writer: W, options: ChannelOptions) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		Self::start(reader, writer, None, options)
	}

	pub(crate) fn start<R, W>(reader: R, writer: W, child: Option<Child>, options: ChannelOptions) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(ChannelState::Connected);
		let pending = Arc::new(AtomicUsize::new(0));
		let shutdown = CancellationToken::new();

		let ctx = PumpContext {
			outbound_rx,
			state_tx,
			pending_gauge: pending.clone(),
			shutdown: shutdown.clone(),
			request_timeout: options.request_timeout,
		};
		spawn(TaskClass::Io, run_channel_io(reader, writer, child, ctx));

		Self {
			outbound_tx,
			state_rx,
			pending,
			shutdown,
		}
	}

	/// Issues a request and returns a handle resolving to its decoded reply.
	pub fn send<T: DeserializeOwned>(&self, data: RequestData) -> ReplyHandle<T> {
		let kind = data.kind();
		let (reply, rx) = oneshot::channel();
		if let Err(mpsc::error::SendError(out)) = self.outbound_tx.send(Outbound { data, reply }) {
			tracing::debug!(%kind, "rpc.send_on_closed_channel");
			let _ = out.reply.send(Outcome::Abandoned(crate::Abandon::Closed));
		}
		ReplyHandle::new(kind, rx)
	}

	/// Issues a request and returns the reply payload untouched.
	pub fn send_raw(&self, data: RequestData) -> ReplyHandle<JsonValue> {
		self.send(data)
	}

	/// Runs a full-text query.
	///
	/// Empty queries and page zero are rejected without touching the pipe.
	pub fn search(&self, query: SearchQuery) -> ReplyHandle<SearchResults> {
		if query.query.trim().is_empty() {
			return invalid(RequestKind::Search, "empty query");
		}
		if query.page == 0 {
			return invalid(RequestKind::Search, "pages start at 1");
		}
		self.send(RequestData::Search(query))
	}

	/// Submits a document for indexing.
	pub fn add(&self, document: Document) -> ReplyHandle<Ack> {
		self.send(RequestData::Add(document))
	}

	/// Removes a url from the index.
	pub fn remove(&self, url: impl Into<String>) -> ReplyHandle<Ack> {
		self.send(RequestData::Remove(UrlTarget::new(url)))
	}

	/// Asks when a url was last indexed.
	pub fn check(&self, url: impl Into<String>) -> ReplyHandle<CheckStatus> {
		self.send(RequestData::Check(UrlTarget::new(url)))
	}

	/// Asks the backend for its version.
	pub fn version(&self, client: impl Into<String>) -> ReplyHandle<VersionInfo> {
		self.send(RequestData::Version(VersionProbe { client: client.into() }))
	}

	/// Current connection state.
	pub fn state(&self) -> ChannelState {
		*self.state_rx.borrow()
	}

	/// Returns true while the pipe is open.
	pub fn is_connected(&self) -> bool {
		self.state() == ChannelState::Connected
	}

	/// Subscribes to state changes.
	pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
		self.state_rx.clone()
	}

	/// Number of requests written and still awaiting a reply.
	pub fn pending_len(&self) -> usize {
		self.pending.load(Ordering::Relaxed)
	}

	/// Asks the pump to stop; pending requests resolve as abandoned.
	pub fn close(&self) {
		self.shutdown.cancel();
	}

	/// Waits until the pipe is closed.
	pub async fn closed(&self) {
		let mut state_rx = self.subscribe_state();
		let _ = state_rx.wait_for(|state| *state == ChannelState::Disconnected).await;
	}
}

fn invalid<T>(kind: RequestKind, reason: &str) -> ReplyHandle<T> {
	tracing::debug!(%kind, reason, "rpc.request_rejected");
	ReplyHandle::resolved(kind, Outcome::Failed(Failure::Invalid(reason.to_string())))
}
