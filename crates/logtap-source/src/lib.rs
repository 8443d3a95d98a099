//! Log sources for logtap
//!
//! This crate reads the recent journal lines of a service unit, either by
//! running `journalctl` or, where that is unavailable, from a fixed local
//! fallback sequence.

mod error;
mod fallback;
mod journal;
mod platform;
mod system;

use std::future::Future;

pub use error::FetchError;
pub use fallback::{FALLBACK_LEN, FallbackSource};
pub use journal::{DEFAULT_JOURNAL_COMMAND, DEFAULT_TIMEOUT, JournalSource};
pub use platform::Platform;
pub use system::SystemLogSource;

/// Something that can produce the most recent lines of a service log
pub trait LogSource: Send + Sync {
    /// Fetch at most `max_lines` lines, oldest first
    fn fetch(
        &self,
        max_lines: usize,
    ) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;
}
