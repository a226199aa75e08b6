use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A process-wide cancellation flag shared by the scheduler and every worker.
///
/// Setting the token makes the scheduler stop dispatching new files, and makes each running
/// worker exit at its next cancellation check. Per-tile files already on disk are left in place.
///
/// # Examples
///
/// ```
/// use pcconvert::CancelToken;
/// let token = CancelToken::new();
/// let clone = token.clone();
/// assert!(!clone.is_cancelled());
/// token.cancel();
/// assert!(clone.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new, unset token.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
