//! JSON-lines transport between the host surfaces and the controller.

use memberry_controller::{HostCommand, HostEvent};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pumps events in and commands out until the controller stops or `shutdown` fires.
///
/// End of input closes the event stream but keeps writing commands until the
/// controller drops its sender.
pub async fn serve<R, W>(
	input: R,
	mut output: W,
	events: mpsc::UnboundedSender<HostEvent>,
	mut commands: mpsc::UnboundedReceiver<HostCommand>,
	shutdown: CancellationToken,
) -> anyhow::Result<()>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut input = BufReader::new(input);
	let mut line = Vec::new();
	let mut events = Some(events);

	loop {
		tokio::select! {
			biased;

			() = shutdown.cancelled() => {
				while let Ok(command) = commands.try_recv() {
					write_command(&mut output, &command).await?;
				}
				break;
			}

			command = commands.recv() => match command {
				Some(command) => write_command(&mut output, &command).await?,
				None => break,
			},

			read = input.read_until(b'\n', &mut line), if events.is_some() => {
				if read? == 0 {
					tracing::debug!("bridge.input_closed");
					events = None;
				} else if let Some(tx) = &events {
					forward(&line, tx);
				}
				line.clear();
			}
		}
	}

	output.flush().await?;
	Ok(())
}

fn forward(line: &[u8], events: &mpsc::UnboundedSender<HostEvent>) {
	let line = line.trim_ascii();
	if line.is_empty() {
		return;
	}
	match serde_json::from_slice::<HostEvent>(line) {
		Ok(event) => {
			if events.send(event).is_err() {
				tracing::debug!("bridge.controller_gone");
			}
		}
		Err(e) => tracing::warn!(error = %e, len = line.len(), "bridge.bad_event"),
	}
}

async fn write_command<W: AsyncWrite + Unpin>(output: &mut W, command: &HostCommand) -> anyhow::Result<()> {
	let mut line = serde_json::to_vec(command)?;
	line.push(b'\n');
	output.write_all(&line).await?;
	output.flush().await?;
	Ok(())
}
