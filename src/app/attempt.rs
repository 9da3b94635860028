//! Workflow-attempt identifiers.
//!
//! Every new file starts a new attempt. Async results carry the attempt they
//! were started under and are dropped when it is no longer current.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out strictly increasing [`AttemptId`]s. `AttemptId::default()` (0) is never issued.
#[derive(Debug, Default)]
pub struct AttemptCounter {
    last: AtomicU64,
}

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> AttemptId {
        AttemptId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
