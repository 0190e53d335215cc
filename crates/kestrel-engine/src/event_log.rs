use chrono::Utc;

use kestrel_core::events::{ClassifiedEvent, PageEvent, classify};

/// Append-only arena of classified page events for one session.
///
/// Consumers read through a monotonic sequence cursor, never through
/// timestamp comparison, so two events sharing a timestamp cannot race
/// into (or out of) a delta.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<ClassifiedEvent>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and append a raw event, assigning the next sequence number
    pub fn append(&mut self, event: PageEvent) {
        let classified = classify(&event, self.next_seq, Utc::now());
        self.next_seq += 1;
        self.events.push(classified);
    }

    /// Events appended since the cursor's last read; advances the cursor
    /// to the end of the log.
    ///
    /// Every event appears in exactly one delta per cursor.
    pub fn delta(&self, cursor: &mut u64) -> Vec<ClassifiedEvent> {
        let from = *cursor;
        *cursor = self.next_seq;
        self.events
            .iter()
            .filter(|e| e.seq >= from)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn all(&self) -> &[ClassifiedEvent] {
        &self.events
    }
}
