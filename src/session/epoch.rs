//! Interruption epoch
//!
//! A generation counter that invalidates asynchronous decode results. Every
//! decode captures an [`Epoch`] when it is submitted and may only apply its
//! result if that value is still current at completion time. There is no
//! other cancellation mechanism for in-flight decodes.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Value of the interruption counter at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(u64);

impl Epoch {
    pub const INITIAL: Epoch = Epoch(0);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// Shared, monotonically increasing interruption counter
///
/// Reads and advances are atomic. Advancing is only done by the playback
/// scheduler while it holds its state lock, so a decode result can never
/// observe the new epoch while the pending set is half drained.
#[derive(Debug, Default)]
pub struct InterruptionEpoch {
    value: AtomicU64,
}

impl InterruptionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.value.load(Ordering::SeqCst))
    }

    /// Advance and return the new epoch
    pub fn advance(&self) -> Epoch {
        Epoch(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, captured: Epoch) -> bool {
        self.current() == captured
    }
}
