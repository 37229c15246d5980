//! Suggestion rendering.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use memberry_protocol::Hit;
use regex::Regex;

static URL_LIKE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"((https?)://)?(([w|W]{3}\.)+)?[a-zA-Z0-9\-\.]{3,}\.[a-zA-Z]{2,}(\.[a-zA-Z]{2,})?")
		.expect("url pattern compiles")
});

/// Escapes the characters that are special in omnibox markup.
pub fn escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&apos;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'&' => out.push_str("&amp;"),
			c => out.push(c),
		}
	}
	out
}

/// Returns true when `text` contains something that looks like a host name.
pub fn is_valid_url(text: &str) -> bool {
	URL_LIKE.is_match(text)
}

/// Fallback when a date cannot be rendered with the configured format.
const FALLBACK_DATE_FORMAT: &str = "%d.%m.%y";

/// Returns true when `format` is a `strftime` string that renders a date.
///
/// Parse-only specifiers such as `%#z` are rejected too.
pub fn is_valid_date_format(format: &str) -> bool {
	render_date(&Local::now(), format).is_some()
}

fn render_date(date: &DateTime<Local>, format: &str) -> Option<String> {
	let mut out = String::new();
	write!(out, "{}", date.format(format)).ok()?;
	Some(out)
}

/// A hit rendered for the omnibox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
	/// Label with `<dim>`/`<url>` markup.
	pub markup: String,
	/// Same label without tags; keys the suggestion mapping.
	pub plain: String,
}

/// Renders `"{date} :: {title}"`, optionally followed by `" - {url}"`.
///
/// A `date_format` that fails to render falls back to `day.month.year`.
pub fn format_suggestion(hit: &Hit, with_url: bool, date_format: &str) -> Formatted {
	let date = hit.visited.with_timezone(&Local);
	let visited = render_date(&date, date_format).unwrap_or_else(|| {
		tracing::warn!(date_format, "controller.date_format_unrenderable");
		date.format(FALLBACK_DATE_FORMAT).to_string()
	});
	let title = escape(&hit.title);

	let mut markup = format!("<dim>{visited}</dim> :: {title}");
	let mut plain = format!("{visited} :: {title}");
	if with_url {
		let url = escape(&hit.url);
		markup.push_str(&format!(" - <url>{url}</url>"));
		plain.push_str(&format!(" - {url}"));
	}

	Formatted { markup, plain }
}
