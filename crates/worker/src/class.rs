/// Execution classes used for task observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Latency-sensitive work that directly affects what the user sees.
	Interactive,
	/// Fire-and-forget work such as index submissions.
	Background,
	/// Long-lived pipe pumps.
	Io,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Io => "io",
		}
	}
}
