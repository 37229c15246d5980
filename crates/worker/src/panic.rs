use tokio::task::JoinError;

/// Extracts the panic message carried by a failed join, if the task panicked.
///
/// Returns `None` for cancelled tasks and for payloads that are not strings.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}

	let payload = err.into_panic();
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		return Some((*s).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}
