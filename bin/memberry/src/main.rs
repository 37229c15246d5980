//! memberry host bridge.
//!
//! Reads host events as JSON lines on stdin, drives the controller, and
//! writes host commands as JSON lines on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use memberry_config::Config;
use memberry_controller::{Connect, Controller, SpawnBackend};
use memberry_worker::{TaskClass, spawn};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod bridge;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "memberry")]
#[command(about = "Search-as-you-type front end for the memberry backend")]
struct Args {
	/// Config file (defaults to the user config directory)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Bridge stdin/stdout to the backend (the default)
	Bridge,
	/// Ask the backend for its version and exit
	Ping,
	/// Print the effective configuration
	Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = Config::load(args.config.as_deref()).context("loading configuration")?;

	match args.command.unwrap_or(Command::Bridge) {
		Command::Bridge => run_bridge(config).await,
		Command::Ping => ping(&config).await,
		Command::Config => {
			print!("{}", toml::to_string_pretty(&config)?);
			Ok(())
		}
	}
}

async fn run_bridge(config: Config) -> anyhow::Result<()> {
	info!(version = env!("CARGO_PKG_VERSION"), "starting memberry");

	let blacklist = config.read_blacklist().context("reading blacklist")?;
	let connector = SpawnBackend::from_config(&config.backend);

	let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
	let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
	let mut controller = Controller::new(config.omnibox, connector, command_tx)?;
	if let Some(raw) = blacklist {
		controller.configure_blacklist(&raw);
	}

	let shutdown = CancellationToken::new();
	let controller_task = spawn(TaskClass::Interactive, controller.run(event_rx, shutdown.clone()));

	let signal_shutdown = shutdown.clone();
	spawn(TaskClass::Background, async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("interrupted");
			signal_shutdown.cancel();
		}
	});

	let bridged = bridge::serve(tokio::io::stdin(), tokio::io::stdout(), event_tx, command_rx, shutdown.clone()).await;

	shutdown.cancel();
	controller_task.await.context("controller task")?;
	bridged?;

	info!("memberry stopped");
	Ok(())
}

async fn ping(config: &Config) -> anyhow::Result<()> {
	let mut connector = SpawnBackend::from_config(&config.backend);
	let channel = connector.connect()?;

	let outcome = channel
		.version(concat!("memberry ", env!("CARGO_PKG_VERSION")))
		.await
		.map(|info| info.version);
	channel.close();

	match outcome {
		memberry_rpc::Outcome::Success(version) => {
			println!("{version}");
			Ok(())
		}
		memberry_rpc::Outcome::Failed(reason) => Err(anyhow::anyhow!(reason)),
		memberry_rpc::Outcome::Abandoned(reason) => Err(anyhow::anyhow!(reason)),
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_env("MEMBERRY_LOG").unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("debug")
			} else {
				EnvFilter::new("info")
			}
		})
	};

	// MEMBERRY_LOG_DIR redirects logs to a per-process file.
	if let Some(log_dir) = std::env::var("MEMBERRY_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("memberry.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "file tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}
