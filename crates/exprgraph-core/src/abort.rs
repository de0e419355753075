//! Cooperative cancellation.
//!
//! Long traversals and model calls poll an [`AbortToken`] at loop
//! boundaries so a caller can stop an in-flight prediction. The token is
//! cheap to clone and safe to trip from another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// The computation observed its token tripped and stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation aborted")]
pub struct Aborted;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    pub fn new() -> Self {
        AbortToken::default()
    }

    /// Trips the token. All clones observe the abort.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Err(Aborted)` once the token has been tripped.
    pub fn check(&self) -> Result<(), Aborted> {
        if self.is_aborted() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }
}
