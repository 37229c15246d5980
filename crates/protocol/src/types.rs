//! Wire types for the backend protocol.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Correlation id pairing a [`Request`] with its [`Reply`].
///
/// Zero is never allocated for outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A request written to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id, echoed back as [`Reply::rid`].
	pub id: RequestId,
	/// Request kind and its payload, serialized as `type` and `data`.
	#[serde(flatten)]
	pub data: RequestData,
}

/// Request payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RequestData {
	/// Full-text query.
	Search(SearchQuery),
	/// Submit a document for indexing.
	Add(Document),
	/// Drop a url from the index.
	Remove(UrlTarget),
	/// Ask when a url was last indexed.
	Check(UrlTarget),
	/// Handshake reporting the client and asking for the backend version.
	Version(VersionProbe),
}

impl RequestData {
	/// Returns the payload kind.
	pub const fn kind(&self) -> RequestKind {
		match self {
			Self::Search(_) => RequestKind::Search,
			Self::Add(_) => RequestKind::Add,
			Self::Remove(_) => RequestKind::Remove,
			Self::Check(_) => RequestKind::Check,
			Self::Version(_) => RequestKind::Version,
		}
	}
}

/// Discriminant of [`RequestData`], used for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// [`RequestData::Search`].
	Search,
	/// [`RequestData::Add`].
	Add,
	/// [`RequestData::Remove`].
	Remove,
	/// [`RequestData::Check`].
	Check,
	/// [`RequestData::Version`].
	Version,
}

impl RequestKind {
	/// Wire name of the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Search => "Search",
			Self::Add => "Add",
			Self::Remove => "Remove",
			Self::Check => "Check",
			Self::Version => "Version",
		}
	}
}

impl fmt::Display for RequestKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A reply read from the backend.
///
/// The backend omits `error` on success and may omit `data` for
/// acknowledgement-only replies. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
	/// Id of the request being answered.
	pub rid: RequestId,
	/// Set when the backend failed to serve the request.
	#[serde(default)]
	pub error: bool,
	/// Type-specific payload.
	#[serde(default)]
	pub data: JsonValue,
}

/// Search payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
	/// Query string, never empty.
	pub query: String,
	/// One-based page number.
	pub page: u32,
	/// Page size.
	pub hits_per_page: u32,
}

impl SearchQuery {
	/// Builds a query for the first page of results.
	pub fn first_page(query: impl Into<String>, hits_per_page: u32) -> Self {
		Self {
			query: query.into(),
			page: 1,
			hits_per_page,
		}
	}
}

/// Document submitted for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
	/// Canonical url, without fragment.
	pub url: String,
	/// Document language as declared by the page.
	pub lang: String,
	/// Best-effort modification time, serialized as RFC 3339.
	pub last_modified: DateTime<Utc>,
	/// Extracted title.
	pub title: String,
	/// Extracted plain text.
	pub contents: String,
}

/// Payload naming a single url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTarget {
	/// Target url.
	pub url: String,
}

impl UrlTarget {
	/// Wraps a url.
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}
}

/// Version handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionProbe {
	/// Client identification string.
	pub client: String,
}

/// Search reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchResults {
	/// Hits on the requested page, best first.
	pub hits: Vec<Hit>,
	/// Total number of matching documents.
	pub total: u32,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
	/// Document url.
	pub url: String,
	/// Document title.
	pub title: String,
	/// Last visit time; epoch milliseconds on the wire, RFC 3339 also accepted.
	#[serde(serialize_with = "ser_epoch_ms", deserialize_with = "de_timestamp")]
	pub visited: DateTime<Utc>,
}

/// Check reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatus {
	/// Modification time of the indexed copy.
	pub last_modified: DateTime<Utc>,
	/// Last time the url was indexed, when reported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub visited: Option<DateTime<Utc>>,
}

/// Version reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
	/// Backend version string.
	pub version: String,
}

fn ser_epoch_ms<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
	s.serialize_i64(ts.timestamp_millis())
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Millis(i64),
		Text(String),
	}

	match Raw::deserialize(d)? {
		Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
			.ok_or_else(|| serde::de::Error::custom(format!("timestamp {ms} out of range"))),
		Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
			.map(|ts| ts.with_timezone(&Utc))
			.map_err(serde::de::Error::custom),
	}
}
