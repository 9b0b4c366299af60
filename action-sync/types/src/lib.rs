//! Shared record types for the action-sync service and its store adapters.

use chrono::{DateTime, Utc};
use serde::Serialize;

// =====================================================
// Records
// =====================================================

/// A card on the kanban collection
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: String,
    pub title: String,
    /// Server-managed modification time
    pub last_edited: Option<DateTime<Utc>>,
    /// Set by this service; `None` means the card was never processed
    pub last_processed: Option<DateTime<Utc>>,
}

impl Card {
    /// Title for log lines
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}

/// An entry in the action items collection
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingEntry {
    pub id: String,
    pub title: String,
    pub completed: bool,
    /// The card this entry was extracted from, if the relation is set
    pub source_card: Option<String>,
    pub date_added: Option<DateTime<Utc>>,
}

/// Request to create a tracking entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackingEntry {
    pub title: String,
    pub source_card: String,
    pub date_added: DateTime<Utc>,
}

// =====================================================
// Reports
// =====================================================

/// Outcome counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Records returned by the enumerating query
    pub candidates: usize,
    /// Cards marked processed, or entries whose card note was rewritten
    pub processed: usize,
    /// Records left alone (up to date, already marked, unsyncable)
    pub skipped: usize,
    /// Tracking entries created
    pub created: usize,
    /// Individual remote operations that failed
    pub failures: usize,
    /// The enumerating query itself failed
    pub aborted: bool,
}

impl PassReport {
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: &PassReport) {
        self.candidates += other.candidates;
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.created += other.created;
        self.failures += other.failures;
        self.aborted |= other.aborted;
    }
}

/// Summary of a full invocation (forward then backward pass)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub forward: PassReport,
    pub backward: PassReport,
}
