//! Allocation engine (autocompilazione) - fills open slot-instances from declared availability.
//!
//! A pass walks the period date by date, then every station operating that day, then its
//! slots in start-time order. For each slot-instance it:
//!
//! 1. skips manually emptied keys (a key with an in-flight removal becomes manually emptied),
//! 2. skips keys already at capacity,
//! 3. picks one male first when the effective set has none and policy requires it,
//! 4. fills the remaining need oldest-last-assigned first.
//!
//! Picks are written to the ledger's pending-addition overlay immediately, so later
//! slot-instances in the same pass see them both for duplicates and for fairness. The pass
//! performs no I/O and is additive: running it again before a save adds nothing.

use crate::core::{
    availability::AvailabilityIndex,
    fairness::FairnessRanker,
    ledger::{AddOutcome, AssignmentLedger, PendingAddition},
    model::{DEFAULT_CAPACITY, Gender, Period, SlotKey, Station, TimeSlot, VolunteerRef},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Business rules applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    /// Capacity when neither slot nor station configures one.
    pub default_capacity: usize,
    /// Require at least one male volunteer in every slot-instance.
    pub require_male: bool,
    /// When no male is available, still fill the slot with whoever is (and warn).
    /// When false, such slot-instances are left untouched apart from the warning.
    pub fill_without_male: bool,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            require_male: true,
            fill_without_male: true,
        }
    }
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    /// Pending additions created by this pass, in the order they were made.
    pub added: Vec<PendingAddition>,
    /// Slot-instances that needed a male volunteer and had none available.
    pub missing_male: Vec<SlotKey>,
    /// Slot-instances skipped because the operator emptied them (or a removal is in flight).
    pub skipped_manual: usize,
    /// Slot-instances skipped because they were already full.
    pub skipped_full: usize,
    /// Slot-instances examined.
    pub considered: usize,
}

impl AllocationSummary {
    #[must_use]
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

/// Read-only inputs of a pass; the ledger is passed to [`AllocationEngine::run`].
pub struct AllocationEngine<'a> {
    stations: &'a [Station],
    index: &'a AvailabilityIndex,
    ranker: &'a FairnessRanker,
    policy: AllocationPolicy,
}

impl<'a> AllocationEngine<'a> {
    #[must_use]
    pub const fn new(
        stations: &'a [Station],
        index: &'a AvailabilityIndex,
        ranker: &'a FairnessRanker,
        policy: AllocationPolicy,
    ) -> Self {
        Self {
            stations,
            index,
            ranker,
            policy,
        }
    }

    pub fn run(&self, period: &Period, ledger: &mut AssignmentLedger) -> AllocationSummary {
        let mut summary = AllocationSummary::default();

        for date in period.dates() {
            for station in self.stations.iter().filter(|s| s.is_active_on(date)) {
                for slot in &station.slots {
                    let key = SlotKey::new(date, slot.id, station.id);
                    summary.considered += 1;
                    self.fill_slot(key, station, slot, ledger, &mut summary);
                }
            }
        }

        info!(
            "Allocation over {} added {} volunteer(s) across {} slot-instance(s); {} without a male",
            period,
            summary.added.len(),
            summary.considered,
            summary.missing_male.len()
        );
        summary
    }

    fn fill_slot(
        &self,
        key: SlotKey,
        station: &Station,
        slot: &TimeSlot,
        ledger: &mut AssignmentLedger,
        summary: &mut AllocationSummary,
    ) {
        if ledger.overrides().contains(&key) {
            summary.skipped_manual += 1;
            return;
        }
        if ledger.has_pending_removal(&key) {
            debug!("{} has a removal in flight, treating it as manually emptied", key);
            ledger.overrides_mut().mark(key);
            summary.skipped_manual += 1;
            return;
        }

        let effective = ledger.effective_assignments(&key);
        let capacity = station.capacity_of(slot, self.policy.default_capacity);
        if effective.len() >= capacity {
            summary.skipped_full += 1;
            return;
        }

        let mut pool: Vec<VolunteerRef> = self
            .index
            .available_volunteers(key.date, slot.id)
            .into_iter()
            .filter(|a| !effective.iter().any(|e| e.volunteer.id == a.volunteer_id))
            .map(|a| a.volunteer())
            .collect();
        if pool.is_empty() {
            return;
        }

        let mut needed = capacity - effective.len();
        let needs_male = self.policy.require_male
            && !effective
                .iter()
                .any(|e| e.volunteer.gender == Gender::Male);

        let mut picks: Vec<VolunteerRef> = Vec::with_capacity(needed);

        if needs_male {
            let males: Vec<VolunteerRef> = pool
                .iter()
                .filter(|v| v.gender == Gender::Male)
                .cloned()
                .collect();

            if let Some(best) = self.ranker.rank(males, ledger, |v| v.id).into_iter().next() {
                pool.retain(|v| v.id != best.id);
                picks.push(best);
                needed -= 1;
            } else {
                warn!("No male volunteer available for {}", key);
                summary.missing_male.push(key);
                if !self.policy.fill_without_male {
                    return;
                }
            }
        }

        picks.extend(
            self.ranker
                .rank(pool, ledger, |v| v.id)
                .into_iter()
                .take(needed),
        );

        for volunteer in picks {
            let name = volunteer.name.clone();
            match ledger.add_pending(key, volunteer.clone()) {
                Ok(AddOutcome::Added) => {
                    debug!("Pending: {} -> {}", name, key);
                    summary.added.push(PendingAddition { key, volunteer });
                }
                Ok(AddOutcome::RemovalCanceled) => {
                    debug!("Restored {} at {}", name, key);
                }
                Err(e) => debug!("Skipped {} at {}: {}", name, key, e),
            }
        }
    }
}
