use std::time::Duration;

use memberry_config::{Browser, OmniboxConfig};
use memberry_controller::{CheckAnswer, Controller, DefaultSuggestion, Disposition, HostCommand, HostEvent};
use memberry_protocol::{Document, Request, RequestData, RequestId, SearchQuery, UrlTarget, decode, read_frame, write_frame};
use memberry_rpc::{Channel, ChannelOptions};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct FakeBackend {
	reader: ReadHalf<DuplexStream>,
	writer: WriteHalf<DuplexStream>,
}

impl FakeBackend {
	async fn next_request(&mut self) -> Request {
		let body = read_frame(&mut self.reader)
			.await
			.expect("read failed")
			.expect("controller closed the pipe");
		decode(&body).expect("undecodable request")
	}

	async fn reply(&mut self, rid: RequestId, error: bool, data: JsonValue) {
		write_frame(&mut self.writer, &json!({"rid": rid, "error": error, "data": data}))
			.await
			.expect("write failed");
	}
}

struct Harness {
	events: mpsc::UnboundedSender<HostEvent>,
	commands: mpsc::UnboundedReceiver<HostCommand>,
	backends: mpsc::UnboundedReceiver<FakeBackend>,
	shutdown: CancellationToken,
	task: JoinHandle<()>,
}

impl Harness {
	fn start(omnibox: OmniboxConfig) -> Self {
		let (backend_tx, backends) = mpsc::unbounded_channel();
		let connector = move || -> memberry_rpc::Result<Channel> {
			let (client, server) = tokio::io::duplex(64 * 1024);
			let (client_rx, client_tx) = tokio::io::split(client);
			let (reader, writer) = tokio::io::split(server);
			let _ = backend_tx.send(FakeBackend { reader, writer });
			Ok(Channel::from_io(client_rx, client_tx, ChannelOptions::default()))
		};

		let (command_tx, commands) = mpsc::unbounded_channel();
		let controller = Controller::new(omnibox, connector, command_tx).unwrap();
		let (events, event_rx) = mpsc::unbounded_channel();
		let shutdown = CancellationToken::new();
		let task = tokio::spawn(controller.run(event_rx, shutdown.clone()));

		Self {
			events,
			commands,
			backends,
			shutdown,
			task,
		}
	}

	fn send(&self, event: HostEvent) {
		self.events.send(event).unwrap();
	}

	async fn backend(&mut self) -> FakeBackend {
		self.backends.recv().await.expect("controller never connected")
	}

	async fn command(&mut self) -> HostCommand {
		self.commands.recv().await.expect("controller stopped")
	}

	async fn stop(self) {
		self.shutdown.cancel();
		self.task.await.unwrap();
	}
}

fn firefox() -> OmniboxConfig {
	OmniboxConfig {
		browser: Browser::Firefox,
		..OmniboxConfig::default()
	}
}

fn input(text: &str) -> HostEvent {
	HostEvent::InputChanged { text: text.into() }
}

fn check(url: &str, reply_to: &str) -> HostEvent {
	HostEvent::Check {
		url: url.into(),
		reply_to: reply_to.into(),
	}
}

fn document(url: &str) -> Document {
	Document {
		url: url.into(),
		lang: "en".into(),
		last_modified: "2020-01-01T00:00:00Z".parse().unwrap(),
		title: "page".into(),
		contents: "body".into(),
	}
}

fn hits(n: usize) -> JsonValue {
	let hits: Vec<JsonValue> = (0..n)
		.map(|i| json!({"url": format!("https://{i}.example"), "title": format!("hit {i}"), "visited": 1_600_000_000_000u64}))
		.collect();
	JsonValue::Array(hits)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn typing_burst_sends_one_search_after_quiet_period() {
	let mut h = Harness::start(OmniboxConfig::default());
	let mut backend = h.backend().await;
	let start = Instant::now();

	h.send(input("r"));
	tokio::time::sleep(Duration::from_millis(100)).await;
	h.send(input("ru"));
	tokio::time::sleep(Duration::from_millis(550)).await;
	h.send(input("  rust  "));

	let req = backend.next_request().await;
	let elapsed = start.elapsed();
	assert!(elapsed >= Duration::from_millis(1350), "fired early: {elapsed:?}");
	assert!(elapsed < Duration::from_millis(1400), "fired late: {elapsed:?}");
	assert_eq!(req.data, RequestData::Search(SearchQuery::first_page("rust", 6)));

	backend.reply(req.id, false, json!({"hits": hits(6), "total": 40})).await;

	assert_eq!(
		h.command().await,
		HostCommand::SetDefaultSuggestion {
			suggestion: DefaultSuggestion::MoreResults { query: "rust".into() },
			description: "Search more results for <match>rust</match>".into(),
		}
	);
	let HostCommand::Suggest { query, entries } = h.command().await else {
		panic!("expected suggestions");
	};
	assert_eq!(query, "rust");
	assert_eq!(entries.len(), 6);
	assert_eq!(entries[0].content, "https://0.example");
	assert!(entries[0].description.starts_with("<dim>"));
	assert!(entries[0].description.ends_with(" :: hit 0 - <url>https://0.example</url>"));
	assert!(entries.iter().all(|e| e.deletable));

	h.stop().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn default_suggestion_follows_total() {
	let mut h = Harness::start(firefox());
	let mut backend = h.backend().await;

	h.send(input("few"));
	let req = backend.next_request().await;
	backend.reply(req.id, false, json!({"hits": hits(2), "total": 2})).await;
	assert_eq!(
		h.command().await,
		HostCommand::SetDefaultSuggestion {
			suggestion: DefaultSuggestion::PickResult,
			description: "Select a result".into(),
		}
	);
	h.command().await;

	h.send(input("none"));
	let req = backend.next_request().await;
	backend.reply(req.id, false, json!({"hits": [], "total": 0})).await;
	assert_eq!(
		h.command().await,
		HostCommand::SetDefaultSuggestion {
			suggestion: DefaultSuggestion::NoResults,
			description: "No results".into(),
		}
	);
	assert_eq!(
		h.command().await,
		HostCommand::Suggest {
			query: "none".into(),
			entries: vec![],
		}
	);

	h.stop().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn empty_query_sends_nothing() {
	let mut h = Harness::start(OmniboxConfig::default());
	let mut backend = h.backend().await;

	h.send(input("   "));
	tokio::time::sleep(Duration::from_millis(800)).await;
	h.send(HostEvent::Index(document("https://a.example")));

	let req = backend.next_request().await;
	assert!(matches!(req.data, RequestData::Add(_)), "unexpected {req:?}");

	h.stop().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn stale_results_are_dropped() {
	let mut h = Harness::start(firefox());
	let mut backend = h.backend().await;

	h.send(input("old"));
	let old = backend.next_request().await;
	h.send(input("new"));
	let new = backend.next_request().await;

	backend.reply(old.id, false, json!({"hits": hits(1), "total": 1})).await;
	backend.reply(new.id, false, json!({"hits": [], "total": 0})).await;

	let HostCommand::SetDefaultSuggestion { suggestion, .. } = h.command().await else {
		panic!("expected default suggestion");
	};
	assert_eq!(suggestion, DefaultSuggestion::NoResults);
	let HostCommand::Suggest { query, .. } = h.command().await else {
		panic!("expected suggestions");
	};
	assert_eq!(query, "new");

	h.stop().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn deleting_a_suggestion_removes_its_url() {
	let mut h = Harness::start(firefox());
	let mut backend = h.backend().await;

	h.send(input("rust"));
	let req = backend.next_request().await;
	backend.reply(req.id, false, json!({"hits": hits(2), "total": 2})).await;
	h.command().await;
	let HostCommand::Suggest { entries, .. } = h.command().await else {
		panic!("expected suggestions");
	};

	h.send(HostEvent::DeleteSuggestion {
		label: "not on screen".into(),
	});
	h.send(HostEvent::DeleteSuggestion {
		label: entries[1].description.clone(),
	});

	let req = backend.next_request().await;
	assert_eq!(req.data, RequestData::Remove(UrlTarget::new("https://1.example")));

	h.stop().await;
}

#[tokio::test]
async fn blacklist_gates_index_and_check() {
	let mut h = Harness::start(OmniboxConfig::default());
	let mut backend = h.backend().await;

	h.send(HostEvent::StorageChanged {
		blacklist: Some("# private\n\nBANK\\.example\n".into()),
	});
	h.send(HostEvent::Index(document("https://bank.example/login")));
	h.send(check("https://www.BANK.example/", "c1"));

	assert_eq!(
		h.command().await,
		HostCommand::CheckAnswer {
			reply_to: "c1".into(),
			answer: CheckAnswer::Blacklisted,
		}
	);

	h.send(HostEvent::StorageChanged { blacklist: None });
	h.send(HostEvent::Index(document("https://news.example/")));
	let req = backend.next_request().await;
	assert_eq!(req.data, RequestData::Add(document("https://news.example/")));

	h.send(check("https://bank.example/", "c2"));
	assert_eq!(
		h.command().await,
		HostCommand::CheckAnswer {
			reply_to: "c2".into(),
			answer: CheckAnswer::Blacklisted,
		}
	);

	h.stop().await;
}

#[tokio::test]
async fn check_relays_reply_or_reason() {
	let mut h = Harness::start(OmniboxConfig::default());
	let mut backend = h.backend().await;

	h.send(check("https://a.example/", "ok"));
	let req = backend.next_request().await;
	assert_eq!(req.data, RequestData::Check(UrlTarget::new("https://a.example/")));
	let payload = json!({"last_modified": "2020-01-01T00:00:00Z", "visited": null, "extra": 1});
	backend.reply(req.id, false, payload.clone()).await;
	assert_eq!(
		h.command().await,
		HostCommand::CheckAnswer {
			reply_to: "ok".into(),
			answer: CheckAnswer::Known(payload),
		}
	);

	h.send(check("https://b.example/", "err"));
	let req = backend.next_request().await;
	backend.reply(req.id, true, json!("not indexed")).await;
	let HostCommand::CheckAnswer { reply_to, answer } = h.command().await else {
		panic!("expected check answer");
	};
	assert_eq!(reply_to, "err");
	assert!(matches!(answer, CheckAnswer::Unanswered(reason) if reason.contains("not indexed")));

	h.stop().await;
}

#[tokio::test]
async fn input_entered_navigates_to_urls_only() {
	let mut h = Harness::start(OmniboxConfig::default());
	h.backend().await;

	h.send(HostEvent::InputEntered {
		text: "just words".into(),
		disposition: Disposition::CurrentTab,
	});
	h.send(HostEvent::InputEntered {
		text: " docs.rs/tokio ".into(),
		disposition: Disposition::NewForegroundTab,
	});

	assert_eq!(
		h.command().await,
		HostCommand::Navigate {
			url: "docs.rs/tokio".into(),
			disposition: Disposition::NewForegroundTab,
		}
	);

	h.stop().await;
}

#[tokio::test]
async fn disconnect_is_sticky_until_reconnect() {
	let mut h = Harness::start(OmniboxConfig::default());
	let mut backend = h.backend().await;

	h.send(check("https://a.example/", "pending"));
	backend.next_request().await;
	drop(backend);

	let HostCommand::CheckAnswer { reply_to, answer } = h.command().await else {
		panic!("expected check answer");
	};
	assert_eq!(reply_to, "pending");
	assert_eq!(answer, CheckAnswer::Unanswered("backend disconnected".into()));

	h.send(check("https://a.example/", "after"));
	let HostCommand::CheckAnswer { answer, .. } = h.command().await else {
		panic!("expected check answer");
	};
	assert_eq!(answer, CheckAnswer::Unanswered("channel closed".into()));

	h.send(HostEvent::Reconnect);
	let mut backend = h.backend().await;
	h.send(check("https://a.example/", "fresh"));
	let req = backend.next_request().await;
	assert_eq!(req.id, RequestId(1));
	backend.reply(req.id, false, json!({"last_modified": "2020-01-01T00:00:00Z"})).await;
	let HostCommand::CheckAnswer { reply_to, answer } = h.command().await else {
		panic!("expected check answer");
	};
	assert_eq!(reply_to, "fresh");
	assert!(matches!(answer, CheckAnswer::Known(_)));

	h.stop().await;
}

#[tokio::test]
async fn bad_date_format_is_rejected_up_front() {
	for date_format in ["%Q", "%#z"] {
		let (tx, _rx) = mpsc::unbounded_channel();
		let omnibox = OmniboxConfig {
			date_format: date_format.into(),
			..OmniboxConfig::default()
		};
		let connector = || -> memberry_rpc::Result<Channel> { unreachable!() };
		assert!(Controller::new(omnibox, connector, tx).is_err(), "{date_format} accepted");
	}
}
