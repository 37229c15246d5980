use std::time::Duration;

use memberry_protocol::{
	CheckStatus, Document, Request, RequestData, RequestId, SearchQuery, SearchResults, UrlTarget,
	decode, read_frame, write_frame,
};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use super::*;

/// Backend side of an in-memory pipe.
struct FakeBackend {
	reader: ReadHalf<DuplexStream>,
	writer: WriteHalf<DuplexStream>,
}

impl FakeBackend {
	async fn next_request(&mut self) -> Request {
		let body = read_frame(&mut self.reader)
			.await
			.expect("read failed")
			.expect("channel closed the pipe");
		decode(&body).expect("undecodable request")
	}

	async fn reply(&mut self, rid: RequestId, error: bool, data: JsonValue) {
		write_frame(&mut self.writer, &json!({"rid": rid, "error": error, "data": data}))
			.await
			.expect("write failed");
	}
}

fn connect(options: ChannelOptions) -> (Channel, FakeBackend) {
	let (client, backend) = tokio::io::duplex(64 * 1024);
	let (client_rx, client_tx) = tokio::io::split(client);
	let (reader, writer) = tokio::io::split(backend);
	(Channel::from_io(client_rx, client_tx, options), FakeBackend { reader, writer })
}

#[tokio::test]
async fn search_round_trip_empties_table() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let handle = channel.search(SearchQuery::first_page("rust", 6));
	let req = backend.next_request().await;
	assert_eq!(req.id, RequestId(1));
	assert_eq!(req.data, RequestData::Search(SearchQuery::first_page("rust", 6)));
	assert_eq!(channel.pending_len(), 1);

	backend.reply(req.id, false, json!({"hits": [], "total": 0})).await;

	assert_eq!(handle.await, Outcome::Success(SearchResults::default()));
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test]
async fn replies_route_by_id_not_order() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let first = channel.check("https://a.example");
	let second = channel.check("https://b.example");
	let req_a = backend.next_request().await;
	let req_b = backend.next_request().await;
	assert_ne!(req_a.id, req_b.id);

	backend.reply(req_b.id, false, json!({"last_modified": "2020-01-02T00:00:00Z"})).await;
	backend.reply(req_a.id, false, json!({"last_modified": "2019-01-01T00:00:00Z"})).await;

	let a: CheckStatus = first.await.success().unwrap();
	let b: CheckStatus = second.await.success().unwrap();
	assert_eq!(a.last_modified.to_rfc3339(), "2019-01-01T00:00:00+00:00");
	assert_eq!(b.last_modified.to_rfc3339(), "2020-01-02T00:00:00+00:00");
}

#[tokio::test]
async fn unknown_rid_has_no_effect() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let handle = channel.send_raw(RequestData::Check(UrlTarget::new("https://a.example")));
	let req = backend.next_request().await;

	backend.reply(RequestId(4242), false, json!("stray")).await;
	backend.reply(req.id, false, json!({"ok": 1})).await;

	assert_eq!(handle.await, Outcome::Success(json!({"ok": 1})));
	assert!(channel.is_connected());
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test]
async fn error_reply_fails_once_and_late_duplicate_is_ignored() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let handle = channel.remove("https://a.example");
	let req = backend.next_request().await;
	backend.reply(req.id, true, json!("index locked")).await;
	assert_eq!(handle.await, Outcome::Failed(Failure::Backend(json!("index locked"))));

	// A second reply for the same id finds nothing to resolve.
	backend.reply(req.id, false, JsonValue::Null).await;

	let next = channel.remove("https://b.example");
	let req2 = backend.next_request().await;
	assert_eq!(req2.id, RequestId(2));
	backend.reply(req2.id, false, JsonValue::Null).await;
	assert_eq!(next.await, Outcome::Success(Ack));
}

#[tokio::test]
async fn disconnect_abandons_pending_and_reopen_ignores_old_ids() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let a = channel.search(SearchQuery::first_page("a", 6));
	let b = channel.search(SearchQuery::first_page("b", 6));
	let req_a = backend.next_request().await;
	let req_b = backend.next_request().await;
	drop(backend);

	assert_eq!(a.await, Outcome::Abandoned(Abandon::Disconnected));
	assert_eq!(b.await, Outcome::Abandoned(Abandon::Disconnected));
	channel.closed().await;
	assert_eq!(channel.state(), ChannelState::Disconnected);
	assert_eq!(
		channel.version("test").await,
		Outcome::Abandoned(Abandon::Closed)
	);

	let (reopened, mut backend) = connect(ChannelOptions::default());
	backend.reply(req_a.id, false, json!({"hits": [], "total": 1})).await;
	backend.reply(req_b.id, false, json!({"hits": [], "total": 2})).await;

	let fresh = reopened.version("test");
	let req = backend.next_request().await;
	assert_eq!(req.id, RequestId(1));
	backend.reply(req.id, false, json!({"version": "1.0"})).await;

	assert_eq!(fresh.await.success().map(|v| v.version), Some("1.0".to_string()));
	assert_eq!(reopened.pending_len(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn deadline_abandons_request_and_drops_late_reply() {
	let (channel, mut backend) = connect(ChannelOptions {
		request_timeout: Duration::from_secs(1),
	});

	let handle = channel.check("https://slow.example");
	let req = backend.next_request().await;

	assert_eq!(handle.await, Outcome::Abandoned(Abandon::TimedOut));
	assert_eq!(channel.pending_len(), 0);

	backend.reply(req.id, false, json!({"last_modified": "2020-01-01T00:00:00Z"})).await;

	let next = channel.check("https://fast.example");
	let req2 = backend.next_request().await;
	assert_eq!(req2.id, RequestId(2));
	backend.reply(req2.id, false, json!({"last_modified": "2021-01-01T00:00:00Z"})).await;
	assert!(next.await.is_success());
	assert!(channel.is_connected());
}

#[tokio::test]
async fn close_abandons_pending_requests() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let handle = channel.check("https://a.example");
	backend.next_request().await;
	channel.close();

	assert_eq!(handle.await, Outcome::Abandoned(Abandon::Disconnected));
	channel.closed().await;
	assert!(!channel.is_connected());
}

#[tokio::test]
async fn rejected_requests_never_reach_the_pipe() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let empty = channel.search(SearchQuery::first_page("   ", 6));
	assert!(matches!(empty.await, Outcome::Failed(Failure::Invalid(_))));

	let huge = channel.add(Document {
		url: "https://big.example".into(),
		lang: "en".into(),
		last_modified: "2020-01-01T00:00:00Z".parse().unwrap(),
		title: "big".into(),
		contents: "x".repeat(memberry_protocol::MAX_OUTBOUND_FRAME),
	});
	assert!(matches!(huge.await, Outcome::Failed(Failure::Encode(_))));
	assert!(channel.is_connected());

	let ok = channel.remove("https://a.example");
	let req = backend.next_request().await;
	assert_eq!(req.data, RequestData::Remove(UrlTarget::new("https://a.example")));
	backend.reply(req.id, false, JsonValue::Null).await;
	assert_eq!(ok.await, Outcome::Success(Ack));
}

#[tokio::test]
async fn undecodable_reply_is_skipped() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	let handle = channel.check("https://a.example");
	let req = backend.next_request().await;
	write_frame(&mut backend.writer, &json!(["not", "a", "reply"])).await.unwrap();
	backend.reply(req.id, false, json!({"last_modified": "2020-01-01T00:00:00Z"})).await;

	assert!(handle.await.is_success());
}

#[tokio::test(flavor = "current_thread")]
async fn queued_requests_are_abandoned_on_close() {
	let (channel, _backend) = connect(ChannelOptions::default());
	let mut state = channel.subscribe_state();
	assert_eq!(*state.borrow_and_update(), ChannelState::Connected);

	// The pump has not run yet, so neither request reaches the pipe.
	let queued = [channel.check("https://a.example"), channel.check("https://b.example")];
	channel.close();

	for handle in queued {
		assert_eq!(handle.await, Outcome::Abandoned(Abandon::Disconnected));
	}
	state.changed().await.unwrap();
	assert_eq!(*state.borrow(), ChannelState::Disconnected);
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn dropped_handle_stays_pending_until_reply() {
	let (channel, mut backend) = connect(ChannelOptions::default());

	drop(channel.check("https://a.example"));
	let req = backend.next_request().await;
	assert_eq!(channel.pending_len(), 1);
	backend.reply(req.id, false, json!({"last_modified": "2020-01-01T00:00:00Z"})).await;

	// Replies are routed in pipe order, so the first is gone once the second resolves.
	let next = channel.check("https://b.example");
	let req2 = backend.next_request().await;
	backend.reply(req2.id, false, json!({"last_modified": "2021-01-01T00:00:00Z"})).await;
	assert!(next.await.is_success());
	assert_eq!(channel.pending_len(), 0);
	assert!(channel.is_connected());
}
