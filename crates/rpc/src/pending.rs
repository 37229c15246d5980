//! Id allocation and the table of requests awaiting a reply.

use std::collections::HashMap;

use memberry_protocol::RequestId;

/// Largest id handed out; the counter wraps to 1 after it.
pub const MAX_REQUEST_ID: u32 = u32::MAX - 1;

/// Monotonic request id counter that wraps before `u32::MAX` and never yields zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdAllocator {
	last: u32,
}

impl IdAllocator {
	/// Creates a counter whose first id is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self { last: 0 }
	}

	/// Creates a counter that continues after `last`.
	#[must_use]
	pub const fn starting_after(last: u32) -> Self {
		Self { last }
	}

	/// Advances the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> RequestId {
		self.last = if self.last >= MAX_REQUEST_ID { 1 } else { self.last + 1 };
		RequestId(self.last)
	}
}

/// Requests awaiting a reply, keyed by the id they were sent with.
///
/// Every key was allocated by this table and is removed exactly once.
#[derive(Debug)]
pub struct PendingTable<T> {
	ids: IdAllocator,
	entries: HashMap<RequestId, T>,
}

impl<T> Default for PendingTable<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> PendingTable<T> {
	/// Creates an empty table with a fresh counter.
	#[must_use]
	pub fn new() -> Self {
		Self::with_allocator(IdAllocator::new())
	}

	/// Creates an empty table using `ids` for allocation.
	#[must_use]
	pub fn with_allocator(ids: IdAllocator) -> Self {
		Self {
			ids,
			entries: HashMap::new(),
		}
	}

	/// Allocates an id not currently pending and stores the entry built for it.
	///
	/// After a wraparound, ids still held by pending entries are skipped.
	pub fn insert_with(&mut self, make: impl FnOnce(RequestId) -> T) -> RequestId {
		debug_assert!(self.entries.len() < MAX_REQUEST_ID as usize, "request id space exhausted");
		let id = loop {
			let id = self.ids.next();
			if !self.entries.contains_key(&id) {
				break id;
			}
		};
		self.entries.insert(id, make(id));
		id
	}

	/// Stores `value` under a freshly allocated id.
	pub fn insert(&mut self, value: T) -> RequestId {
		self.insert_with(|_| value)
	}

	/// Removes and returns the entry for `id`.
	pub fn take(&mut self, id: RequestId) -> Option<T> {
		self.entries.remove(&id)
	}

	/// Returns true when `id` is awaiting a reply.
	pub fn contains(&self, id: RequestId) -> bool {
		self.entries.contains_key(&id)
	}

	/// Removes every entry.
	pub fn drain(&mut self) -> impl Iterator<Item = (RequestId, T)> + '_ {
		self.entries.drain()
	}

	/// Number of pending requests.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
