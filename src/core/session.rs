//! Planner session - one operator's working copy of a scheduling period.
//!
//! A session loads a snapshot (stations, availability, persisted assignments, fairness history
//! and the manual-override registry) and keeps every edit local until [`PlannerSession::save`].
//! Each edit that changes the registry writes it back to the store immediately, so a manually
//! emptied slot stays emptied even if the session is dropped without saving.

use crate::{
    core::{
        allocation::{AllocationEngine, AllocationPolicy, AllocationSummary},
        availability::AvailabilityIndex,
        fairness::FairnessRanker,
        ledger::{AddOutcome, AssignmentLedger, AssignmentRef, EffectiveVolunteer},
        model::{Gender, Period, SlotKey, SlotState, Station, TimeSlot},
        overrides::ManualOverrides,
        reconcile::{self, FlushReport},
        store::SchedulingStore,
    },
    errors::{Error, Result},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PlannerSession<S> {
    store: Arc<S>,
    period: Period,
    policy: AllocationPolicy,
    stations: Vec<Station>,
    availability: AvailabilityIndex,
    ranker: FairnessRanker,
    ledger: AssignmentLedger,
}

impl<S> PlannerSession<S>
where
    S: SchedulingStore,
{
    /// Loads the period's snapshot and its persisted registry.
    pub async fn open(store: Arc<S>, period: Period, policy: AllocationPolicy) -> Result<Self> {
        let mut session = Self {
            store,
            period,
            policy,
            stations: Vec::new(),
            availability: AvailabilityIndex::default(),
            ranker: FairnessRanker::default(),
            ledger: AssignmentLedger::default(),
        };
        session.refresh().await?;
        info!(
            "Opened {} with {} station(s), {} assignment(s), {} manually emptied slot(s)",
            session.period,
            session.stations.len(),
            session.ledger.persisted().len(),
            session.ledger.overrides().len()
        );
        Ok(session)
    }

    /// Re-reads stations, availability, history, persisted assignments and the registry.
    /// Pending overlays are kept.
    pub async fn refresh(&mut self) -> Result<()> {
        let (stations, availabilities, assignments, history, overrides) = tokio::try_join!(
            self.store.stations(self.period),
            self.store.availabilities(self.period),
            self.store.assignments(self.period),
            self.store.last_assignment_dates(self.period.start),
            self.store.load_overrides(self.period),
        )?;

        debug!(
            "Snapshot of {}: {} availability record(s), {} volunteer(s) with history",
            self.period,
            availabilities.len(),
            history.len()
        );

        self.stations = stations;
        self.availability = AvailabilityIndex::new(availabilities);
        if self.availability.is_empty() {
            warn!("No availability declared for {}", self.period);
        }
        self.ranker = FairnessRanker::new(history);
        self.ledger.reseed(assignments);
        self.ledger.replace_overrides(overrides);
        Ok(())
    }

    async fn persist_overrides(&self) -> Result<()> {
        self.store
            .save_overrides(self.period, self.ledger.overrides().clone())
            .await
    }

    fn locate(&self, key: &SlotKey) -> Result<(&Station, &TimeSlot)> {
        let unknown = || Error::UnknownSlot { key: *key };
        if !self.period.contains(key.date) {
            return Err(unknown());
        }
        let station = self
            .stations
            .iter()
            .find(|s| s.id == key.station_id)
            .filter(|s| s.is_active_on(key.date))
            .ok_or_else(unknown)?;
        let slot = station.slot(key.slot_id).ok_or_else(unknown)?;
        Ok((station, slot))
    }

    fn capacity(&self, key: &SlotKey) -> Result<usize> {
        let (station, slot) = self.locate(key)?;
        Ok(station.capacity_of(slot, self.policy.default_capacity))
    }

    /// Runs one allocation pass over the period. Nothing is persisted until [`Self::save`].
    pub async fn autofill(&mut self) -> Result<AllocationSummary> {
        let before = self.ledger.overrides().clone();

        let engine =
            AllocationEngine::new(&self.stations, &self.availability, &self.ranker, self.policy);
        let summary = engine.run(&self.period, &mut self.ledger);

        if self.ledger.overrides() != &before {
            self.persist_overrides().await?;
        }
        Ok(summary)
    }

    /// Manually adds a volunteer to a slot-instance.
    ///
    /// The volunteer must have declared availability and the slot-instance must have room.
    /// A successful addition releases the key from the manual-override registry.
    pub async fn assign(&mut self, key: SlotKey, volunteer_id: i64) -> Result<AddOutcome> {
        let capacity = self.capacity(&key)?;

        let volunteer = self
            .availability
            .find(key.date, key.slot_id, volunteer_id)
            .filter(|a| a.is_assignable())
            .map(|a| a.volunteer())
            .ok_or(Error::NotAvailable { volunteer_id, key })?;

        if self.ledger.is_effectively_assigned(&key, volunteer_id) {
            return Err(Error::AlreadyAssigned { volunteer_id, key });
        }
        if self.ledger.effective_count(&key) >= capacity {
            return Err(Error::SlotFull { key, capacity });
        }

        let was_manual = self.ledger.overrides().contains(&key);
        let outcome = self.ledger.add_pending(key, volunteer)?;
        if was_manual {
            self.persist_overrides().await?;
        }

        debug!("Assigned volunteer {} to {} ({:?})", volunteer_id, key, outcome);
        Ok(outcome)
    }

    /// Manually removes a volunteer, marking the owning slot-instance as manually emptied.
    pub async fn unassign(&mut self, target: AssignmentRef, volunteer_id: i64) -> Result<SlotKey> {
        let key = self.ledger.remove_pending(target, volunteer_id)?;
        self.persist_overrides().await?;

        debug!("Removed volunteer {} from {}", volunteer_id, key);
        Ok(key)
    }

    /// Flushes pending changes to the store.
    ///
    /// On failure the pending overlays stay as they were and [`Error::FlushFailed`] is
    /// returned, so calling `save` again retries only what is still outstanding.
    pub async fn save(&mut self) -> Result<FlushReport> {
        let report = reconcile::flush(&self.store, &self.period, &mut self.ledger)
            .await?
            .into_result()?;

        let registry = self.ledger.overrides().clone();
        self.refresh().await?;
        self.ledger.replace_overrides(registry);
        self.persist_overrides().await?;

        Ok(report)
    }

    /// Deletes every persisted assignment in the period (optionally for one station), drops all
    /// pending changes and releases the affected keys from the registry. Returns the number of
    /// assignments deleted.
    pub async fn reset(&mut self, station_id: Option<i64>) -> Result<u64> {
        let deleted = self.store.reset_assignments(self.period, station_id).await?;

        self.ledger.clear_pending();
        match station_id {
            Some(id) => {
                let kept = ManualOverrides::new(
                    self.ledger
                        .overrides()
                        .iter()
                        .filter(|k| k.station_id != id)
                        .copied(),
                );
                self.ledger.replace_overrides(kept);
            }
            None => self.ledger.overrides_mut().clear_all(),
        }
        self.persist_overrides().await?;

        let registry = self.ledger.overrides().clone();
        self.refresh().await?;
        self.ledger.replace_overrides(registry);

        info!("Reset {}: {} assignment(s) deleted", self.period, deleted);
        Ok(deleted)
    }

    /// Display state of a slot-instance, merging persisted and pending state.
    pub fn slot_status(&self, key: &SlotKey) -> Result<SlotState> {
        let capacity = self.capacity(key)?;
        if self.ledger.overrides().contains(key) {
            return Ok(SlotState::ManuallyEmpty);
        }

        let effective = self.ledger.effective_assignments(key);
        let filled = effective.len();
        Ok(if filled == 0 {
            SlotState::Empty
        } else if filled < capacity {
            SlotState::Partial { filled, capacity }
        } else {
            SlotState::Full {
                has_male: effective
                    .iter()
                    .any(|e| e.volunteer.gender == Gender::Male),
            }
        })
    }

    #[must_use]
    pub fn effective_assignments(&self, key: &SlotKey) -> Vec<EffectiveVolunteer> {
        self.ledger.effective_assignments(key)
    }

    /// Effective assignment count per volunteer across the period.
    #[must_use]
    pub fn volunteer_loads(&self) -> BTreeMap<i64, usize> {
        self.ledger.volunteer_loads()
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.ledger.has_pending_changes()
    }

    #[must_use]
    pub const fn period(&self) -> Period {
        self.period
    }

    #[must_use]
    pub const fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    #[must_use]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    #[must_use]
    pub const fn availability(&self) -> &AvailabilityIndex {
        &self.availability
    }

    #[must_use]
    pub const fn ledger(&self) -> &AssignmentLedger {
        &self.ledger
    }
}
