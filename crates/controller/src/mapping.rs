use std::collections::HashMap;

/// Label → url lookup for the suggestions currently on screen.
///
/// Replaced wholesale by every suggestion batch, so a label only ever
/// resolves against the batch the user is looking at.
#[derive(Debug, Default)]
pub struct SuggestionMap {
	urls: HashMap<String, String>,
}

impl SuggestionMap {
	/// Creates an empty mapping.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces every entry with `entries`.
	pub fn replace(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
		self.urls.clear();
		self.urls.extend(entries);
	}

	/// Url shown under `label`, if any.
	pub fn resolve(&self, label: &str) -> Option<&str> {
		self.urls.get(label).map(String::as_str)
	}

	/// Number of labels.
	pub fn len(&self) -> usize {
		self.urls.len()
	}

	/// Returns true when nothing is mapped.
	pub fn is_empty(&self) -> bool {
		self.urls.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn replace_drops_previous_batch() {
		let mut map = SuggestionMap::new();
		map.replace([("a".to_string(), "https://a".to_string())]);
		assert_eq!(map.resolve("a"), Some("https://a"));

		map.replace([("b".to_string(), "https://b".to_string())]);
		assert_eq!(map.resolve("a"), None);
		assert_eq!(map.resolve("b"), Some("https://b"));
		assert_eq!(map.len(), 1);

		map.replace([]);
		assert!(map.is_empty());
	}
}
