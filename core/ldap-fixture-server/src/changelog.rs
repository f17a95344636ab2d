//! Revision-numbered record of directory writes.

use std::sync::Mutex;

/// Kind of write recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub revision: u64,
    pub kind: ChangeKind,
    pub dn: String,
    pub principal: String,
    /// Generalized time of the write.
    pub timestamp: String,
}

#[derive(Debug, Default)]
struct LogState {
    revision: u64,
    events: Vec<ChangeEvent>,
}

/// Appends writes while enabled. Revisions start at 1 and never repeat.
#[derive(Debug)]
pub struct ChangeLog {
    enabled: bool,
    state: Mutex<LogState>,
}

impl ChangeLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a write and returns its revision, or `None` while disabled.
    pub fn record(
        &self,
        kind: ChangeKind,
        dn: &str,
        principal: &str,
        timestamp: &str,
    ) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state.lock().unwrap();
        state.revision += 1;
        let revision = state.revision;
        state.events.push(ChangeEvent {
            revision,
            kind,
            dn: dn.to_string(),
            principal: principal.to_string(),
            timestamp: timestamp.to_string(),
        });
        Some(revision)
    }

    pub fn current_revision(&self) -> u64 {
        self.state.lock().unwrap().revision
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.state.lock().unwrap().events.clone()
    }
}
