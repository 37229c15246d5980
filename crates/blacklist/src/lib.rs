//! Url blacklist deciding what may be sent to the backend.
//!
//! The blacklist is persisted as free text, one case-insensitive regular
//! expression per line. Lines starting with `#` are comments; blank lines are
//! ignored. A url is blocked by the first pattern that matches anywhere in it.

use regex::{Regex, RegexBuilder};

/// A line that could not be compiled into a pattern.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: invalid pattern {pattern:?}: {source}")]
pub struct RejectedPattern {
	/// One-based line number in the raw text.
	pub line: usize,
	/// The trimmed line.
	pub pattern: String,
	/// Compilation failure.
	#[source]
	pub source: regex::Error,
}

#[derive(Debug, Clone)]
struct Rule {
	source: String,
	re: Regex,
}

/// Compiled, ordered list of blacklist patterns.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
	rules: Vec<Rule>,
}

impl Blacklist {
	/// Creates an empty blacklist that allows everything.
	pub fn new() -> Self {
		Self::default()
	}

	/// Compiles `raw` into a new blacklist.
	///
	/// Invalid lines are skipped and returned alongside the result.
	pub fn parse(raw: &str) -> (Self, Vec<RejectedPattern>) {
		let mut rules = Vec::new();
		let mut rejected = Vec::new();

		for (idx, line) in raw.lines().enumerate() {
			let pattern = line.trim();
			if pattern.is_empty() || pattern.starts_with('#') {
				continue;
			}

			match RegexBuilder::new(pattern).case_insensitive(true).build() {
				Ok(re) => rules.push(Rule {
					source: pattern.to_string(),
					re,
				}),
				Err(source) => rejected.push(RejectedPattern {
					line: idx + 1,
					pattern: pattern.to_string(),
					source,
				}),
			}
		}

		(Self { rules }, rejected)
	}

	/// Replaces every pattern with those compiled from `raw`.
	///
	/// The previous list stays in effect until the new one is fully built.
	pub fn configure(&mut self, raw: &str) -> Vec<RejectedPattern> {
		let (next, rejected) = Self::parse(raw);
		for err in &rejected {
			tracing::warn!(line = err.line, pattern = %err.pattern, error = %err.source, "blacklist.invalid_pattern");
		}
		tracing::debug!(patterns = next.rules.len(), "blacklist.configured");
		*self = next;
		rejected
	}

	/// Returns the first pattern matching `url`, if any.
	pub fn blocking_pattern(&self, url: &str) -> Option<&str> {
		self.rules
			.iter()
			.find(|rule| rule.re.is_match(url))
			.map(|rule| rule.source.as_str())
	}

	/// Returns true when no pattern matches `url`.
	pub fn is_allowed(&self, url: &str) -> bool {
		match self.blocking_pattern(url) {
			Some(pattern) => {
				tracing::debug!(%pattern, %url, "blacklist.blocked");
				false
			}
			None => true,
		}
	}

	/// Patterns in evaluation order.
	pub fn patterns(&self) -> impl Iterator<Item = &str> {
		self.rules.iter().map(|rule| rule.source.as_str())
	}

	/// Number of compiled patterns.
	pub fn len(&self) -> usize {
		self.rules.len()
	}

	/// Returns true when nothing is blacklisted.
	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}
}
