//! Fairness ranker - rotates duty by preferring whoever has waited longest since their last shift.

use crate::core::ledger::AssignmentLedger;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Orders candidates oldest-last-assigned first.
///
/// The last assignment date of a volunteer is the latest of the recorded history before the
/// period and their effective (persisted or pending) assignments inside it. Volunteers never
/// assigned sort first; ties go to the lower volunteer id.
#[derive(Debug, Clone, Default)]
pub struct FairnessRanker {
    history: HashMap<i64, NaiveDate>,
}

impl FairnessRanker {
    #[must_use]
    pub const fn new(history: HashMap<i64, NaiveDate>) -> Self {
        Self { history }
    }

    #[must_use]
    pub fn last_assigned(&self, ledger: &AssignmentLedger, volunteer_id: i64) -> Option<NaiveDate> {
        let recorded = self.history.get(&volunteer_id).copied();
        let in_period = ledger.last_assignment_date(volunteer_id);
        recorded.max(in_period)
    }

    /// Sorts `candidates` by staleness. `id_of` extracts the volunteer id of a candidate.
    #[must_use]
    pub fn rank<T, F>(&self, mut candidates: Vec<T>, ledger: &AssignmentLedger, id_of: F) -> Vec<T>
    where
        F: Fn(&T) -> i64,
    {
        // `None` orders before any date, which is exactly "never assigned first".
        candidates.sort_by_cached_key(|c| {
            let id = id_of(c);
            (self.last_assigned(ledger, id), id)
        });
        candidates
    }
}
