//! Orchestration between the browser surfaces and the backend.
//!
//! The [`Controller`] receives [`HostEvent`]s (omnibox input, extracted
//! pages, settings changes), consults the blacklist, issues requests over a
//! [`memberry_rpc::Channel`], and answers with [`HostCommand`]s.
//!
//! * [`format`]: suggestion rendering and the url heuristic
//! * [`SuggestionMap`]: label to url lookup for deletable suggestions
//! * [`Connect`]: the seam through which a backend channel is opened

#![warn(missing_docs)]

mod connect;
mod controller;
mod event;
pub mod format;
mod mapping;

pub use connect::{Connect, SpawnBackend};
pub use controller::Controller;
pub use event::{CheckAnswer, DefaultSuggestion, Disposition, HostCommand, HostEvent, SuggestEntry};
pub use mapping::SuggestionMap;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while setting up or driving the controller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The backend could not be reached.
	#[error("backend unavailable: {0}")]
	Connect(#[from] memberry_rpc::Error),
	/// The configured visit date format is not a valid `strftime` string.
	#[error("invalid date format {0:?}")]
	DateFormat(String),
}
