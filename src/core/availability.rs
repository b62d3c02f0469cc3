//! Availability index - declared availability looked up by (date, slot).

use crate::core::model::Availability;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Read-only index over the availability snapshot of a period.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    by_slot: HashMap<(NaiveDate, i64), Vec<Availability>>,
}

impl AvailabilityIndex {
    /// Builds the index. A repeated (volunteer, date, slot) declaration replaces the earlier one.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = Availability>) -> Self {
        let mut by_slot: HashMap<(NaiveDate, i64), Vec<Availability>> = HashMap::new();

        for record in records {
            let bucket = by_slot.entry((record.date, record.slot_id)).or_default();
            if let Some(existing) = bucket
                .iter_mut()
                .find(|a| a.volunteer_id == record.volunteer_id)
            {
                *existing = record;
            } else {
                bucket.push(record);
            }
        }

        Self { by_slot }
    }

    /// Volunteers available for the slot on `date` whose volunteer record is active, in
    /// declaration order.
    #[must_use]
    pub fn available_volunteers(&self, date: NaiveDate, slot_id: i64) -> Vec<&Availability> {
        self.by_slot
            .get(&(date, slot_id))
            .map(|records| records.iter().filter(|a| a.is_assignable()).collect())
            .unwrap_or_default()
    }

    /// The declaration of one volunteer, whatever its state.
    #[must_use]
    pub fn find(&self, date: NaiveDate, slot_id: i64, volunteer_id: i64) -> Option<&Availability> {
        self.by_slot
            .get(&(date, slot_id))
            .and_then(|records| records.iter().find(|a| a.volunteer_id == volunteer_id))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}
