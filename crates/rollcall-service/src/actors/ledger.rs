//! Submission ledger: latest accepted submission per participant.
//!
//! The ledger is owned by the coordinator actor and only ever touched from
//! its task, so the mailbox is the mutual-exclusion boundary: an `upsert`
//! either runs before a `drain` (and lands in the drained entries) or after
//! it (and is rejected because the session is no longer active).

use super::messages::SubmissionEntry;
use std::collections::HashMap;

#[derive(Debug)]
struct Slot {
    entry: SubmissionEntry,
    /// Acceptance order, used to break timestamp ties.
    seq: u64,
}

/// Map from participant identity to their most recent accepted submission.
#[derive(Debug, Default)]
pub struct SubmissionLedger {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl SubmissionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `entry.participant_id`.
    ///
    /// A later submission replaces the earlier one unconditionally, whichever
    /// rotation window the earlier code came from.
    pub fn upsert(&mut self, entry: SubmissionEntry) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.slots
            .insert(entry.participant_id.clone(), Slot { entry, seq });
    }

    /// Number of distinct participants recorded.
    #[must_use]
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Empty the ledger and return its entries ordered by acceptance time.
    pub fn drain(&mut self) -> Vec<SubmissionEntry> {
        let mut slots: Vec<Slot> = self.slots.drain().map(|(_, slot)| slot).collect();
        slots.sort_by(|a, b| {
            a.entry
                .accepted_at
                .cmp(&b.entry.accepted_at)
                .then(a.seq.cmp(&b.seq))
        });
        self.next_seq = 0;
        slots.into_iter().map(|slot| slot.entry).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::code::AttendanceCode;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(participant: &str, code: &str, offset_secs: i64) -> SubmissionEntry {
        let base = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
        SubmissionEntry {
            participant_id: participant.to_string(),
            label: format!("label-{participant}"),
            code: AttendanceCode::normalize(code),
            accepted_at: base + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_upsert_counts_distinct_participants() {
        let mut ledger = SubmissionLedger::new();
        ledger.upsert(entry("1", "AAAA", 0));
        ledger.upsert(entry("2", "AAAA", 1));
        ledger.upsert(entry("1", "BBBB", 2));

        assert_eq!(ledger.count(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let mut ledger = SubmissionLedger::new();
        ledger.upsert(entry("1", "AAAA", 0));
        ledger.upsert(entry("1", "BBBB", 20));
        ledger.upsert(entry("1", "CCCC", 40));

        let drained = ledger.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].code.as_str(), "CCCC");
        assert_eq!(drained[0].accepted_at, entry("1", "CCCC", 40).accepted_at);
    }

    #[test]
    fn test_drain_orders_by_acceptance_time() {
        let mut ledger = SubmissionLedger::new();
        ledger.upsert(entry("late", "AAAA", 30));
        ledger.upsert(entry("early", "AAAA", 5));
        ledger.upsert(entry("middle", "AAAA", 15));

        let order: Vec<_> = ledger
            .drain()
            .into_iter()
            .map(|e| e.participant_id)
            .collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_drain_breaks_timestamp_ties_by_arrival() {
        let mut ledger = SubmissionLedger::new();
        ledger.upsert(entry("b", "AAAA", 0));
        ledger.upsert(entry("a", "AAAA", 0));
        ledger.upsert(entry("c", "AAAA", 0));

        let order: Vec<_> = ledger
            .drain()
            .into_iter()
            .map(|e| e.participant_id)
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_drain_empties_ledger() {
        let mut ledger = SubmissionLedger::new();
        ledger.upsert(entry("1", "AAAA", 0));

        assert_eq!(ledger.drain().len(), 1);
        assert_eq!(ledger.count(), 0);
        assert!(ledger.drain().is_empty());
    }
}
