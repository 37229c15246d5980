use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::{TaskClass, spawn};

/// Trailing-edge debouncer.
///
/// Every [`call`](Self::call) cancels the invocation scheduled by the
/// previous one and schedules a new one `delay` later. Only the arguments of
/// the most recent call ever reach the wrapped function; earlier ones are
/// discarded. Dropping the handle discards a pending invocation.
#[derive(Debug)]
pub struct Debounced<T> {
	tx: mpsc::UnboundedSender<T>,
	delay: Duration,
	task: JoinHandle<()>,
}

impl<T: Send + 'static> Debounced<T> {
	/// Wraps `f` so that bursts of calls collapse into one trailing call.
	pub fn new<F>(delay: Duration, f: F) -> Self
	where
		F: FnMut(T) + Send + 'static,
	{
		let (tx, rx) = mpsc::unbounded_channel();
		let task = spawn(TaskClass::Interactive, pump(delay, rx, f));
		Self { tx, delay, task }
	}

	/// Schedules `f(args)` after the quiet period, superseding any pending call.
	pub fn call(&self, args: T) {
		if self.tx.send(args).is_err() {
			tracing::warn!("debounce.pump_gone");
		}
	}

	/// Quiet period between the last call and the invocation.
	pub const fn delay(&self) -> Duration {
		self.delay
	}
}

impl<T> Drop for Debounced<T> {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn pump<T, F: FnMut(T)>(delay: Duration, mut rx: mpsc::UnboundedReceiver<T>, mut f: F) {
	while let Some(mut latest) = rx.recv().await {
		let deadline = sleep(delay);
		tokio::pin!(deadline);

		loop {
			tokio::select! {
				biased;

				next = rx.recv() => match next {
					Some(args) => {
						latest = args;
						deadline.as_mut().reset(Instant::now() + delay);
					}
					None => return,
				},

				() = &mut deadline => {
					f(latest);
					break;
				}
			}
		}
	}
}
