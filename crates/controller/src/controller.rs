//! The controller event loop.

use memberry_blacklist::Blacklist;
use memberry_config::{Browser, OmniboxConfig};
use memberry_protocol::{Document, RequestData, RequestKind, SearchQuery, SearchResults, UrlTarget};
use memberry_rpc::{Ack, Channel, Outcome};
use memberry_worker::{Debounced, join_error_panic_message};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::connect::Connect;
use crate::event::{CheckAnswer, DefaultSuggestion, Disposition, HostCommand, HostEvent, SuggestEntry};
use crate::format::{format_suggestion, is_valid_date_format, is_valid_url};
use crate::mapping::SuggestionMap;
use crate::{Error, Result};

/// A request that finished on its own task.
enum Completion {
	Search {
		generation: u64,
		query: String,
		outcome: Outcome<SearchResults>,
	},
	Check {
		reply_to: String,
		outcome: Outcome<JsonValue>,
	},
	Ack {
		kind: RequestKind,
		url: String,
		outcome: Outcome<Ack>,
	},
}

/// Owns every piece of per-session state and reacts to host events.
///
/// All state is touched only from [`run`](Self::run); requests run as tasks
/// whose results are folded back into the loop.
pub struct Controller<C> {
	connector: C,
	channel: Option<Channel>,
	blacklist: Blacklist,
	suggestions: SuggestionMap,
	debounce: Debounced<String>,
	queries: mpsc::UnboundedReceiver<String>,
	commands: mpsc::UnboundedSender<HostCommand>,
	tasks: JoinSet<Completion>,
	/// Bumped for every search sent; results from older searches are stale.
	generation: u64,
	omnibox: OmniboxConfig,
}

impl<C: Connect> Controller<C> {
	/// Builds a controller that reports to `commands`.
	///
	/// Must be called inside a tokio runtime.
	///
	/// # Errors
	///
	/// Returns [`Error::DateFormat`] when the configured date format is unusable.
	pub fn new(omnibox: OmniboxConfig, connector: C, commands: mpsc::UnboundedSender<HostCommand>) -> Result<Self> {
		if !is_valid_date_format(&omnibox.date_format) {
			return Err(Error::DateFormat(omnibox.date_format));
		}

		let (query_tx, queries) = mpsc::unbounded_channel();
		let debounce = Debounced::new(omnibox.debounce(), move |query: String| {
			let _ = query_tx.send(query);
		});

		Ok(Self {
			connector,
			channel: None,
			blacklist: Blacklist::new(),
			suggestions: SuggestionMap::new(),
			debounce,
			queries,
			commands,
			tasks: JoinSet::new(),
			generation: 0,
			omnibox,
		})
	}

	/// Replaces the blacklist with the patterns in `raw`.
	pub fn configure_blacklist(&mut self, raw: &str) {
		let rejected = self.blacklist.configure(raw);
		tracing::info!(patterns = self.blacklist.len(), rejected = rejected.len(), "controller.blacklist_configured");
	}

	/// The active blacklist.
	pub fn blacklist(&self) -> &Blacklist {
		&self.blacklist
	}

	/// Returns the channel, connecting first if none was ever opened.
	///
	/// A channel that has since disconnected is returned as is; use
	/// [`reopen`](Self::reopen) to replace it.
	///
	/// # Errors
	///
	/// Returns [`Error::Connect`] when the backend cannot be reached.
	pub fn open(&mut self) -> Result<&Channel> {
		let channel = match self.channel.take() {
			Some(channel) => channel,
			None => {
				let channel = self.connector.connect()?;
				tracing::info!("controller.channel_opened");
				channel
			}
		};
		Ok(&*self.channel.insert(channel))
	}

	/// Closes the current channel, if any, and opens a new one.
	///
	/// # Errors
	///
	/// Returns [`Error::Connect`] when the backend cannot be reached.
	pub fn reopen(&mut self) -> Result<&Channel> {
		if let Some(old) = self.channel.take() {
			old.close();
			tracing::info!(pending = old.pending_len(), "controller.channel_closed");
		}
		self.open()
	}

	/// Runs until `events` closes or `shutdown` fires.
	///
	/// On exit in-flight requests are cancelled and the channel is closed.
	pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HostEvent>, shutdown: CancellationToken) {
		if let Err(e) = self.open() {
			tracing::warn!(error = %e, "controller.initial_connect_failed");
		}

		loop {
			tokio::select! {
				biased;

				() = shutdown.cancelled() => {
					tracing::debug!("controller.shutdown");
					break;
				}

				done = self.tasks.join_next(), if !self.tasks.is_empty() => match done {
					Some(Ok(completion)) => self.complete(completion),
					Some(Err(e)) if e.is_cancelled() => {}
					Some(Err(e)) => {
						let message = join_error_panic_message(e).unwrap_or_default();
						tracing::error!(%message, "controller.task_panicked");
					}
					None => {}
				},

				query = self.queries.recv() => {
					if let Some(query) = query {
						self.search(query);
					}
				}

				event = events.recv() => match event {
					Some(event) => self.handle(event),
					None => {
						tracing::debug!("controller.host_closed");
						break;
					}
				},
			}
		}

		self.tasks.shutdown().await;
		if let Some(channel) = self.channel.take() {
			channel.close();
		}
	}

	fn handle(&mut self, event: HostEvent) {
		match event {
			HostEvent::InputChanged { text } => self.debounce.call(text.trim().to_string()),
			HostEvent::InputEntered { text, disposition } => self.navigate(text.trim(), disposition),
			HostEvent::DeleteSuggestion { label } => self.delete_suggestion(&label),
			HostEvent::Index(document) => self.index(document),
			HostEvent::Check { url, reply_to } => self.check(url, reply_to),
			HostEvent::StorageChanged { blacklist: Some(raw) } => self.configure_blacklist(&raw),
			HostEvent::StorageChanged { blacklist: None } => {
				tracing::trace!("controller.storage_change_ignored");
			}
			HostEvent::Reconnect => {
				if let Err(e) = self.reopen() {
					tracing::warn!(error = %e, "controller.reconnect_failed");
				}
			}
		}
	}

	fn connected(&mut self) -> Option<Channel> {
		match self.open() {
			Ok(channel) => Some(channel.clone()),
			Err(e) => {
				tracing::warn!(error = %e, "controller.backend_unavailable");
				None
			}
		}
	}

	fn search(&mut self, query: String) {
		if query.is_empty() {
			tracing::debug!("controller.empty_query");
			return;
		}
		let Some(channel) = self.connected() else {
			return;
		};

		self.generation += 1;
		let generation = self.generation;
		let handle = channel.search(SearchQuery::first_page(query.clone(), self.omnibox.hits_per_page));
		self.tasks.spawn(async move {
			Completion::Search {
				generation,
				query,
				outcome: handle.await,
			}
		});
	}

	fn navigate(&self, text: &str, disposition: Disposition) {
		if !is_valid_url(text) {
			tracing::debug!(text, "controller.not_a_url");
			return;
		}
		self.emit(HostCommand::Navigate {
			url: text.to_string(),
			disposition,
		});
	}

	fn delete_suggestion(&mut self, label: &str) {
		let Some(url) = self.suggestions.resolve(label).map(str::to_string) else {
			tracing::debug!(label, "controller.unmapped_suggestion");
			return;
		};
		let Some(channel) = self.connected() else {
			return;
		};

		let handle = channel.remove(url.clone());
		let kind = handle.kind();
		self.tasks.spawn(async move {
			Completion::Ack {
				kind,
				url,
				outcome: handle.await,
			}
		});
	}

	fn index(&mut self, document: Document) {
		if !self.blacklist.is_allowed(&document.url) {
			return;
		}
		let Some(channel) = self.connected() else {
			return;
		};

		let url = document.url.clone();
		let handle = channel.add(document);
		let kind = handle.kind();
		self.tasks.spawn(async move {
			Completion::Ack {
				kind,
				url,
				outcome: handle.await,
			}
		});
	}

	fn check(&mut self, url: String, reply_to: String) {
		if !self.blacklist.is_allowed(&url) {
			self.emit(HostCommand::CheckAnswer {
				reply_to,
				answer: CheckAnswer::Blacklisted,
			});
			return;
		}
		let Some(channel) = self.connected() else {
			self.emit(HostCommand::CheckAnswer {
				reply_to,
				answer: CheckAnswer::Unanswered("backend unavailable".into()),
			});
			return;
		};

		let handle = channel.send_raw(RequestData::Check(UrlTarget::new(url)));
		self.tasks.spawn(async move {
			Completion::Check {
				reply_to,
				outcome: handle.await,
			}
		});
	}

	fn complete(&mut self, completion: Completion) {
		match completion {
			Completion::Search {
				generation,
				query,
				outcome,
			} => {
				if generation != self.generation {
					tracing::debug!(%query, "controller.stale_results");
					return;
				}
				match outcome {
					Outcome::Success(results) => self.show(query, results),
					Outcome::Failed(reason) => tracing::warn!(%query, %reason, "controller.search_failed"),
					Outcome::Abandoned(reason) => tracing::warn!(%query, %reason, "controller.search_abandoned"),
				}
			}
			Completion::Check { reply_to, outcome } => {
				let answer = match outcome {
					Outcome::Success(payload) => CheckAnswer::Known(payload),
					Outcome::Failed(reason) => CheckAnswer::Unanswered(reason.to_string()),
					Outcome::Abandoned(reason) => CheckAnswer::Unanswered(reason.to_string()),
				};
				self.emit(HostCommand::CheckAnswer { reply_to, answer });
			}
			Completion::Ack { kind, url, outcome } => match outcome {
				Outcome::Success(Ack) => tracing::debug!(%kind, %url, "controller.acknowledged"),
				Outcome::Failed(reason) => tracing::warn!(%kind, %url, %reason, "controller.request_failed"),
				Outcome::Abandoned(reason) => tracing::warn!(%kind, %url, %reason, "controller.request_abandoned"),
			},
		}
	}

	fn show(&mut self, query: String, results: SearchResults) {
		let chrome = self.omnibox.browser == Browser::Chrome;

		let mut mapping = Vec::with_capacity(results.hits.len());
		let mut entries = Vec::with_capacity(results.hits.len());
		for hit in &results.hits {
			let formatted = format_suggestion(hit, chrome, &self.omnibox.date_format);
			entries.push(SuggestEntry {
				content: hit.url.clone(),
				description: if chrome { formatted.markup } else { formatted.plain.clone() },
				deletable: true,
			});
			mapping.push((formatted.plain, hit.url.clone()));
		}
		self.suggestions.replace(mapping);

		let suggestion = DefaultSuggestion::for_results(&query, results.total, self.omnibox.hits_per_page);
		let description = suggestion.description(self.omnibox.browser);
		tracing::debug!(%query, hits = entries.len(), total = results.total, "controller.suggest");

		self.emit(HostCommand::SetDefaultSuggestion { suggestion, description });
		self.emit(HostCommand::Suggest { query, entries });
	}

	fn emit(&self, command: HostCommand) {
		if self.commands.send(command).is_err() {
			tracing::debug!("controller.host_gone");
		}
	}
}
