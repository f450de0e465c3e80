//! Operator interrupt requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by an operator to stop the mutation loop after the current mutant.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Fresh, not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Raise the returned flag on Ctrl-C. The handler is process-wide and is
/// installed at most once; later calls return the same flag.
#[cfg(feature = "cli")]
pub fn install_ctrlc_handler() -> Result<InterruptFlag, String> {
    use std::sync::OnceLock;

    static INIT: OnceLock<Result<InterruptFlag, String>> = OnceLock::new();

    INIT.get_or_init(|| {
        let flag = InterruptFlag::new();
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || handler_flag.raise())
            .map(|()| flag)
            .map_err(|e| e.to_string())
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = InterruptFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_raised());
        flag.raise();
        assert!(observer.is_raised());
        observer.reset();
        assert!(!flag.is_raised());
    }
}
