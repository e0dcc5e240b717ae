//! Spawn audit trail
//!
//! Every spawn attempt leaves a record of how far it got and what was
//! released on the way out, so tests can check cleanup without poking at
//! kernel internals.

use crate::spawn::SpawnError;
use core_types::{ContextId, Pid, ThreadId};
use serde::{Deserialize, Serialize};

/// Step of a spawn at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnStage {
    Read,
    Parse,
    Load,
    CreateThread,
}

/// Event in a spawn's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnEvent {
    /// Image read into memory
    ImageRead { path: String, size_bytes: usize },
    /// Header accepted
    ImageParsed {
        path: String,
        entry_address: u64,
        segment_count: usize,
    },
    /// Loader built a context
    ContextLoaded { path: String, context_id: ContextId },
    /// Image buffer released
    ImageReleased { path: String },
    /// Context destroyed before it was ever attached
    ContextDiscarded { context_id: ContextId },
    /// Thread made runnable
    ProcessStarted {
        path: String,
        pid: Pid,
        thread_id: ThreadId,
        context_id: ContextId,
    },
    /// Spawn gave up
    SpawnFailed {
        path: String,
        stage: SpawnStage,
        error: SpawnError,
    },
}

/// Audit log for spawn operations
#[derive(Debug, Clone)]
pub struct SpawnAuditLog {
    events: Vec<SpawnEvent>,
}

impl SpawnAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Records an event
    pub fn record(&mut self, event: SpawnEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[SpawnEvent] {
        &self.events
    }

    /// Clears all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SpawnEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SpawnEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for SpawnAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query() {
        let mut log = SpawnAuditLog::new();
        log.record(SpawnEvent::ImageRead {
            path: "/c/a.exe".to_string(),
            size_bytes: 128,
        });
        log.record(SpawnEvent::ImageReleased {
            path: "/c/a.exe".to_string(),
        });
        log.record(SpawnEvent::SpawnFailed {
            path: "/c/a.exe".to_string(),
            stage: SpawnStage::Load,
            error: SpawnError::OutOfMemory,
        });

        assert_eq!(log.events().len(), 3);
        assert!(log.has_event(|e| matches!(
            e,
            SpawnEvent::SpawnFailed {
                stage: SpawnStage::Load,
                ..
            }
        )));
        assert_eq!(
            log.count_events(|e| matches!(e, SpawnEvent::ImageReleased { .. })),
            1
        );

        log.clear();
        assert!(log.events().is_empty());
    }
}
