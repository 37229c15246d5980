//! Messages exchanged with the host surfaces.

use memberry_config::Browser;
use memberry_protocol::Document;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value as JsonValue, json};

use crate::format::escape;

/// Something the host surfaces report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
	/// The omnibox text changed.
	InputChanged {
		/// Current omnibox text.
		text: String,
	},
	/// The user accepted the omnibox text.
	InputEntered {
		/// Accepted text.
		text: String,
		/// Where the result should open.
		disposition: Disposition,
	},
	/// The user deleted a suggestion.
	DeleteSuggestion {
		/// Plain label of the deleted suggestion.
		label: String,
	},
	/// A page was extracted and should be indexed.
	Index(Document),
	/// A page asks whether it needs re-indexing.
	Check {
		/// Page url.
		url: String,
		/// Token echoed in the answer.
		reply_to: String,
	},
	/// Synced settings changed.
	StorageChanged {
		/// New blacklist text, when the change touched it.
		#[serde(default)]
		blacklist: Option<String>,
	},
	/// Drop the current backend connection and open a fresh one.
	Reconnect,
}

/// Where an accepted omnibox entry opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Disposition {
	/// Replace the current tab.
	CurrentTab,
	/// New tab, focused.
	NewForegroundTab,
	/// New tab, unfocused.
	NewBackgroundTab,
}

/// Something the host surfaces should do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
	/// Replace the omnibox suggestions.
	Suggest {
		/// Query the suggestions answer.
		query: String,
		/// Suggestions in backend order.
		entries: Vec<SuggestEntry>,
	},
	/// Replace the default (first) omnibox line.
	SetDefaultSuggestion {
		/// Which default applies.
		suggestion: DefaultSuggestion,
		/// Rendered text.
		description: String,
	},
	/// Open a url.
	Navigate {
		/// Target url as typed.
		url: String,
		/// Where to open it.
		disposition: Disposition,
	},
	/// Answer to a [`HostEvent::Check`].
	CheckAnswer {
		/// Token from the check event.
		reply_to: String,
		/// The answer.
		answer: CheckAnswer,
	},
}

/// One omnibox suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestEntry {
	/// Url filled in when the suggestion is picked.
	pub content: String,
	/// Rendered label.
	pub description: String,
	/// Whether the user may delete it.
	pub deletable: bool,
}

/// The default omnibox line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultSuggestion {
	/// More hits exist than were shown.
	MoreResults {
		/// Query being searched.
		query: String,
	},
	/// Every hit is shown.
	PickResult,
	/// Nothing matched.
	NoResults,
}

impl DefaultSuggestion {
	/// Picks the default line for a result set.
	pub fn for_results(query: &str, total: u32, hits_per_page: u32) -> Self {
		if total > hits_per_page {
			Self::MoreResults {
				query: query.to_string(),
			}
		} else if total > 0 {
			Self::PickResult
		} else {
			Self::NoResults
		}
	}

	/// Renders the line for `browser`.
	pub fn description(&self, browser: Browser) -> String {
		match self {
			Self::MoreResults { query } => match browser {
				Browser::Chrome => format!("Search more results for <match>{}</match>", escape(query)),
				Browser::Firefox => format!("Search more results for {query}"),
			},
			Self::PickResult => "Select a result".to_string(),
			Self::NoResults => "No results".to_string(),
		}
	}
}

/// Answer to a check request.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckAnswer {
	/// The url is blacklisted; the backend was not asked.
	Blacklisted,
	/// The backend's reply payload, verbatim.
	Known(JsonValue),
	/// No answer could be obtained.
	Unanswered(String),
}

impl CheckAnswer {
	/// JSON shape handed to the page.
	pub fn to_json(&self) -> JsonValue {
		match self {
			Self::Blacklisted => json!({ "blacklisted": true }),
			Self::Known(payload) => payload.clone(),
			Self::Unanswered(reason) => json!({ "error": reason }),
		}
	}
}

impl Serialize for CheckAnswer {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		self.to_json().serialize(s)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn events_parse_from_tagged_json() {
		let ev: HostEvent = serde_json::from_str(r#"{"event": "input_changed", "text": " rust "}"#).unwrap();
		assert_eq!(ev, HostEvent::InputChanged { text: " rust ".into() });

		let ev: HostEvent =
			serde_json::from_str(r#"{"event": "input_entered", "text": "example.com", "disposition": "newBackgroundTab"}"#)
				.unwrap();
		assert_eq!(
			ev,
			HostEvent::InputEntered {
				text: "example.com".into(),
				disposition: Disposition::NewBackgroundTab,
			}
		);

		let ev: HostEvent = serde_json::from_str(
			r#"{"event": "index", "url": "https://a.example", "lang": "en", "last_modified": "2020-01-01T00:00:00Z", "title": "A", "contents": "body"}"#,
		)
		.unwrap();
		assert!(matches!(ev, HostEvent::Index(doc) if doc.url == "https://a.example"));
	}

	#[test]
	fn storage_change_without_blacklist_key_is_none() {
		let ev: HostEvent = serde_json::from_str(r#"{"event": "storage_changed"}"#).unwrap();
		assert_eq!(ev, HostEvent::StorageChanged { blacklist: None });

		let ev: HostEvent = serde_json::from_str(r#"{"event": "storage_changed", "blacklist": ""}"#).unwrap();
		assert_eq!(ev, HostEvent::StorageChanged { blacklist: Some(String::new()) });
	}

	#[test]
	fn default_suggestion_thresholds() {
		assert_eq!(
			DefaultSuggestion::for_results("q", 7, 6),
			DefaultSuggestion::MoreResults { query: "q".into() }
		);
		assert_eq!(DefaultSuggestion::for_results("q", 6, 6), DefaultSuggestion::PickResult);
		assert_eq!(DefaultSuggestion::for_results("q", 0, 6), DefaultSuggestion::NoResults);
	}

	#[test]
	fn more_results_marks_query_on_chrome_only() {
		let more = DefaultSuggestion::MoreResults { query: "a<b".into() };
		assert_eq!(more.description(Browser::Chrome), "Search more results for <match>a&lt;b</match>");
		assert_eq!(more.description(Browser::Firefox), "Search more results for a<b");
	}

	#[test]
	fn commands_serialize_tagged() {
		let cmd = HostCommand::CheckAnswer {
			reply_to: "7".into(),
			answer: CheckAnswer::Blacklisted,
		};
		assert_eq!(
			serde_json::to_value(&cmd).unwrap(),
			json!({"command": "check_answer", "reply_to": "7", "answer": {"blacklisted": true}})
		);

		let cmd = HostCommand::SetDefaultSuggestion {
			suggestion: DefaultSuggestion::NoResults,
			description: "No results".into(),
		};
		assert_eq!(
			serde_json::to_value(&cmd).unwrap(),
			json!({"command": "set_default_suggestion", "suggestion": {"kind": "no_results"}, "description": "No results"})
		);
	}
}
