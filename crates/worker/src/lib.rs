//! Task primitives shared by the memberry crates.
//!
//! * [`spawn`]: classified task spawning on the ambient tokio runtime
//! * [`Debounced`]: trailing-edge debouncing of high-frequency calls
//! * [`join_error_panic_message`]: panic payload extraction for join errors

mod class;
mod debounce;
mod panic;
mod spawn;

pub use class::TaskClass;
pub use debounce::Debounced;
pub use panic::join_error_panic_message;
pub use spawn::spawn;
