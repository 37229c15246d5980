use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memberry_protocol::{Reply, Request, RequestId, RequestKind, decode, read_frame, write_frame};
use memberry_worker::{TaskClass, spawn};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::channel::{ChannelState, Outbound};
use crate::outcome::{Abandon, Failure, Outcome};
use crate::pending::PendingTable;

/// A request written to the pipe and awaiting its reply.
struct InFlight {
	kind: RequestKind,
	reply: oneshot::Sender<Outcome<JsonValue>>,
	deadline: delay_queue::Key,
}

enum Inbound {
	Frame(Vec<u8>),
	Closed,
	Failed(memberry_protocol::Error),
}

/// Everything the pump needs besides the pipe itself.
pub(crate) struct PumpContext {
	pub(crate) outbound_rx: mpsc::UnboundedReceiver<Outbound>,
	pub(crate) state_tx: watch::Sender<ChannelState>,
	pub(crate) pending_gauge: Arc<AtomicUsize>,
	pub(crate) shutdown: CancellationToken,
	pub(crate) request_timeout: Duration,
}

/// Runs the pump for one pipe until it closes, fails, or is shut down.
///
/// Owns the pending table; it is never touched from anywhere else.
pub(crate) async fn run_channel_io<R, W>(reader: R, mut writer: W, child: Option<Child>, ctx: PumpContext)
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let PumpContext {
		mut outbound_rx,
		state_tx,
		pending_gauge,
		shutdown,
		request_timeout,
	} = ctx;

	let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
	let reader_task = spawn(TaskClass::Io, read_frames(reader, inbound_tx));

	let mut pending: PendingTable<InFlight> = PendingTable::new();
	let mut deadlines: DelayQueue<RequestId> = DelayQueue::new();

	loop {
		tokio::select! {
			biased;

			() = shutdown.cancelled() => {
				tracing::debug!("rpc.shutdown_requested");
				break;
			}

			inbound = inbound_rx.recv() => match inbound {
				Some(Inbound::Frame(body)) => dispatch_reply(&body, &mut pending, &mut deadlines),
				Some(Inbound::Closed) | None => {
					tracing::info!("rpc.backend_closed_pipe");
					break;
				}
				Some(Inbound::Failed(e)) => {
					tracing::error!(error = %e, "rpc.read_failed");
					break;
				}
			},

			expired = poll_fn(|cx| deadlines.poll_expired(cx)), if !deadlines.is_empty() => {
				if let Some(expired) = expired {
					let id = expired.into_inner();
					if let Some(entry) = pending.take(id) {
						tracing::warn!(%id, kind = %entry.kind, "rpc.request_timed_out");
						let _ = entry.reply.send(Outcome::Abandoned(Abandon::TimedOut));
					}
				}
			}

			out = outbound_rx.recv() => match out {
				Some(out) => {
					if let Err(e) = submit(&mut writer, &mut pending, &mut deadlines, request_timeout, out).await {
						tracing::error!(error = %e, "rpc.write_failed");
						break;
					}
				}
				None => {
					tracing::debug!("rpc.all_handles_dropped");
					break;
				}
			},
		}

		pending_gauge.store(pending.len(), Ordering::Relaxed);
	}

	state_tx.send_replace(ChannelState::Disconnected);
	outbound_rx.close();

	let mut abandoned = 0usize;
	for (_, entry) in pending.drain() {
		let _ = entry.reply.send(Outcome::Abandoned(Abandon::Disconnected));
		abandoned += 1;
	}
	while let Ok(out) = outbound_rx.try_recv() {
		let _ = out.reply.send(Outcome::Abandoned(Abandon::Disconnected));
		abandoned += 1;
	}
	pending_gauge.store(0, Ordering::Relaxed);

	let _ = writer.shutdown().await;
	reader_task.abort();

	if let Some(mut child) = child {
		// Best-effort kill, then wait a bit.
		let _ = child.start_kill();
		let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
	}

	tracing::info!(abandoned, "rpc.disconnected");
}

/// Reads frames on a dedicated task so a partially read frame is never dropped by `select!`.
async fn read_frames<R: AsyncRead + Unpin>(mut reader: R, inbound_tx: mpsc::UnboundedSender<Inbound>) {
	loop {
		let msg = match read_frame(&mut reader).await {
			Ok(Some(body)) => Inbound::Frame(body),
			Ok(None) => Inbound::Closed,
			Err(e) => Inbound::Failed(e),
		};
		let last = !matches!(msg, Inbound::Frame(_));
		if inbound_tx.send(msg).is_err() || last {
			return;
		}
	}
}

/// Allocates an id, records the request as pending, and writes it.
///
/// Returns an error only when the pipe itself failed.
async fn submit<W: AsyncWrite + Unpin>(
	writer: &mut W,
	pending: &mut PendingTable<InFlight>,
	deadlines: &mut DelayQueue<RequestId>,
	request_timeout: Duration,
	out: Outbound,
) -> Result<(), memberry_protocol::Error> {
	let Outbound { data, reply } = out;
	let kind = data.kind();
	let id = pending.insert_with(|id| InFlight {
		kind,
		reply,
		deadline: deadlines.insert(id, request_timeout),
	});
	let request = Request { id, data };

	match write_frame(writer, &request).await {
		Ok(()) => {
			tracing::debug!(%id, %kind, "rpc.sent");
			Ok(())
		}
		Err(e @ (memberry_protocol::Error::FrameTooLarge { .. } | memberry_protocol::Error::Json(_))) => {
			tracing::warn!(%id, %kind, error = %e, "rpc.encode_failed");
			if let Some(entry) = pending.take(id) {
				deadlines.remove(&entry.deadline);
				let _ = entry.reply.send(Outcome::Failed(Failure::Encode(e.to_string())));
			}
			Ok(())
		}
		Err(e) => {
			if let Some(entry) = pending.take(id) {
				deadlines.remove(&entry.deadline);
				let _ = entry.reply.send(Outcome::Abandoned(Abandon::Disconnected));
			}
			Err(e)
		}
	}
}

/// Routes one inbound frame to the request it answers.
fn dispatch_reply(body: &[u8], pending: &mut PendingTable<InFlight>, deadlines: &mut DelayQueue<RequestId>) {
	let reply: Reply = match decode(body) {
		Ok(reply) => reply,
		Err(e) => {
			tracing::warn!(error = %e, len = body.len(), "rpc.reply_undecodable");
			return;
		}
	};

	let Some(entry) = pending.take(reply.rid) else {
		tracing::debug!(rid = %reply.rid, "rpc.reply_unknown_rid");
		return;
	};
	deadlines.remove(&entry.deadline);

	let outcome = if reply.error {
		tracing::warn!(rid = %reply.rid, kind = %entry.kind, "rpc.backend_error");
		Outcome::Failed(Failure::Backend(reply.data))
	} else {
		tracing::debug!(rid = %reply.rid, kind = %entry.kind, "rpc.reply");
		Outcome::Success(reply.data)
	};

	if entry.reply.send(outcome).is_err() {
		tracing::trace!(rid = %reply.rid, "rpc.caller_gone");
	}
}
