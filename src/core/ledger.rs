//! Assignment ledger - persisted assignments of a period plus the local pending overlays.
//!
//! The ledger owns three pieces of state:
//! - the persisted snapshot read from the store,
//! - pending additions, keyed by slot-instance,
//! - pending removals, keyed by assignment id with the set of volunteers to detach.
//!
//! It also owns the [`ManualOverrides`] registry, because every operator edit that goes
//! through the ledger changes it. Mutations are synchronous and visible to the very next read.

use crate::{
    core::{
        model::{Assignment, SlotKey, VolunteerRef},
        overrides::ManualOverrides,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Where a volunteer shown in a slot-instance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRef {
    /// Already persisted under this assignment id.
    Persisted(i64),
    /// Only present in the pending-addition overlay for this key.
    Pending(SlotKey),
}

impl fmt::Display for AssignmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "assignment {id}"),
            Self::Pending(key) => write!(f, "pending {key}"),
        }
    }
}

/// One volunteer of the effective set of a slot-instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveVolunteer {
    pub volunteer: VolunteerRef,
    pub source: AssignmentRef,
}

/// A volunteer slated to be assigned but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAddition {
    pub key: SlotKey,
    pub volunteer: VolunteerRef,
}

/// What a successful [`AssignmentLedger::add_pending`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new pending addition was recorded.
    Added,
    /// The volunteer was pending removal at this key; the removal was dropped instead.
    RemovalCanceled,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentLedger {
    persisted: Vec<Assignment>,
    by_key: HashMap<SlotKey, Vec<usize>>,
    pending_additions: BTreeMap<SlotKey, Vec<VolunteerRef>>,
    pending_removals: BTreeMap<i64, BTreeSet<i64>>,
    overrides: ManualOverrides,
}

impl AssignmentLedger {
    #[must_use]
    pub fn new(persisted: Vec<Assignment>, overrides: ManualOverrides) -> Self {
        let mut ledger = Self {
            overrides,
            ..Self::default()
        };
        ledger.reseed(persisted);
        ledger
    }

    /// Replaces the persisted snapshot. Overlays and the override registry are kept; callers
    /// clear the overlays first when the snapshot reflects a completed flush.
    pub fn reseed(&mut self, persisted: Vec<Assignment>) {
        let mut by_key: HashMap<SlotKey, Vec<usize>> = HashMap::new();
        for (idx, assignment) in persisted.iter().enumerate() {
            by_key.entry(assignment.key()).or_default().push(idx);
        }
        self.persisted = persisted;
        self.by_key = by_key;
    }

    fn persisted_at(&self, key: &SlotKey) -> impl Iterator<Item = &Assignment> {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(|&idx| &self.persisted[idx])
    }

    fn is_removal_pending(&self, assignment_id: i64, volunteer_id: i64) -> bool {
        self.pending_removals
            .get(&assignment_id)
            .is_some_and(|ids| ids.contains(&volunteer_id))
    }

    /// Persisted volunteers for the key that are not pending removal, followed by the
    /// pending additions for the key.
    #[must_use]
    pub fn effective_assignments(&self, key: &SlotKey) -> Vec<EffectiveVolunteer> {
        let mut effective: Vec<EffectiveVolunteer> = Vec::new();

        for assignment in self.persisted_at(key) {
            for volunteer in &assignment.volunteers {
                if self.is_removal_pending(assignment.id, volunteer.id)
                    || effective.iter().any(|e| e.volunteer.id == volunteer.id)
                {
                    continue;
                }
                effective.push(EffectiveVolunteer {
                    volunteer: volunteer.clone(),
                    source: AssignmentRef::Persisted(assignment.id),
                });
            }
        }

        for volunteer in self.pending_additions.get(key).into_iter().flatten() {
            effective.push(EffectiveVolunteer {
                volunteer: volunteer.clone(),
                source: AssignmentRef::Pending(*key),
            });
        }

        effective
    }

    #[must_use]
    pub fn effective_count(&self, key: &SlotKey) -> usize {
        self.effective_assignments(key).len()
    }

    #[must_use]
    pub fn is_effectively_assigned(&self, key: &SlotKey, volunteer_id: i64) -> bool {
        self.effective_assignments(key)
            .iter()
            .any(|e| e.volunteer.id == volunteer_id)
    }

    /// Records a pending addition.
    ///
    /// Rejects a volunteer already effective or already pending for the key. A volunteer
    /// pending removal from a persisted assignment at the key is restored by dropping the
    /// removal. Either way the key leaves the manual-override registry.
    pub fn add_pending(&mut self, key: SlotKey, volunteer: VolunteerRef) -> Result<AddOutcome> {
        let volunteer_id = volunteer.id;

        let already_pending = self
            .pending_additions
            .get(&key)
            .is_some_and(|list| list.iter().any(|v| v.id == volunteer_id));
        if already_pending || self.is_effectively_assigned(&key, volunteer_id) {
            return Err(Error::AlreadyAssigned { volunteer_id, key });
        }

        let removed_from = self
            .persisted_at(&key)
            .find(|a| a.has_volunteer(volunteer_id) && self.is_removal_pending(a.id, volunteer_id))
            .map(|a| a.id);

        let outcome = if let Some(assignment_id) = removed_from {
            if let Some(ids) = self.pending_removals.get_mut(&assignment_id) {
                ids.remove(&volunteer_id);
                if ids.is_empty() {
                    self.pending_removals.remove(&assignment_id);
                }
            }
            AddOutcome::RemovalCanceled
        } else {
            self.pending_additions
                .entry(key)
                .or_default()
                .push(volunteer);
            AddOutcome::Added
        };

        self.overrides.clear(&key);
        Ok(outcome)
    }

    /// Detaches a volunteer: drops a pending addition, or records a pending removal against a
    /// persisted assignment. Either way the owning key is marked as manually emptied and
    /// returned.
    pub fn remove_pending(&mut self, target: AssignmentRef, volunteer_id: i64) -> Result<SlotKey> {
        let not_assigned = || Error::NotAssigned {
            volunteer_id,
            target: target.to_string(),
        };

        let key = match target {
            AssignmentRef::Pending(key) => {
                let list = self.pending_additions.get_mut(&key).ok_or_else(not_assigned)?;
                let position = list
                    .iter()
                    .position(|v| v.id == volunteer_id)
                    .ok_or_else(not_assigned)?;
                list.remove(position);
                if list.is_empty() {
                    self.pending_additions.remove(&key);
                }
                key
            }
            AssignmentRef::Persisted(assignment_id) => {
                let key = self
                    .persisted
                    .iter()
                    .find(|a| {
                        a.id == assignment_id
                            && a.has_volunteer(volunteer_id)
                            && !self.is_removal_pending(a.id, volunteer_id)
                    })
                    .map(Assignment::key)
                    .ok_or_else(not_assigned)?;
                self.pending_removals
                    .entry(assignment_id)
                    .or_default()
                    .insert(volunteer_id);
                key
            }
        };

        self.overrides.mark(key);
        Ok(key)
    }

    /// Whether the key has a pending removal that still targets a persisted volunteer.
    #[must_use]
    pub fn has_pending_removal(&self, key: &SlotKey) -> bool {
        self.persisted_at(key).any(|a| {
            self.pending_removals
                .get(&a.id)
                .is_some_and(|ids| ids.iter().any(|id| a.has_volunteer(*id)))
        })
    }

    /// Most recent date on which the volunteer is effectively assigned anywhere in the
    /// period, counting pending additions.
    #[must_use]
    pub fn last_assignment_date(&self, volunteer_id: i64) -> Option<NaiveDate> {
        let persisted = self
            .persisted
            .iter()
            .filter(|a| a.has_volunteer(volunteer_id) && !self.is_removal_pending(a.id, volunteer_id))
            .map(|a| a.date);

        let pending = self
            .pending_additions
            .iter()
            .filter(|(_, list)| list.iter().any(|v| v.id == volunteer_id))
            .map(|(key, _)| key.date);

        persisted.chain(pending).max()
    }

    /// Number of effective assignments per volunteer across the period.
    #[must_use]
    pub fn volunteer_loads(&self) -> BTreeMap<i64, usize> {
        let mut loads: BTreeMap<i64, usize> = BTreeMap::new();
        let mut keys: BTreeSet<SlotKey> = self.by_key.keys().copied().collect();
        keys.extend(self.pending_additions.keys().copied());

        for key in &keys {
            for effective in self.effective_assignments(key) {
                *loads.entry(effective.volunteer.id).or_default() += 1;
            }
        }
        loads
    }

    /// Pending additions in key order.
    #[must_use]
    pub fn pending_additions(&self) -> Vec<PendingAddition> {
        self.pending_additions
            .iter()
            .flat_map(|(key, list)| {
                list.iter().map(|volunteer| PendingAddition {
                    key: *key,
                    volunteer: volunteer.clone(),
                })
            })
            .collect()
    }

    /// Pending removals as (assignment id, volunteer id) pairs.
    #[must_use]
    pub fn pending_removals(&self) -> Vec<(i64, i64)> {
        self.pending_removals
            .iter()
            .flat_map(|(assignment_id, ids)| ids.iter().map(|id| (*assignment_id, *id)))
            .collect()
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending_additions.is_empty() || !self.pending_removals.is_empty()
    }

    /// Empties both overlays. The override registry is untouched.
    pub fn clear_pending(&mut self) {
        self.pending_additions.clear();
        self.pending_removals.clear();
    }

    #[must_use]
    pub fn persisted(&self) -> &[Assignment] {
        &self.persisted
    }

    #[must_use]
    pub const fn overrides(&self) -> &ManualOverrides {
        &self.overrides
    }

    pub const fn overrides_mut(&mut self) -> &mut ManualOverrides {
        &mut self.overrides
    }

    pub fn replace_overrides(&mut self, overrides: ManualOverrides) {
        self.overrides = overrides;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::model::Gender;

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn volunteer(id: i64, gender: Gender) -> VolunteerRef {
        VolunteerRef {
            id,
            name: format!("Volunteer {id}"),
            gender,
        }
    }

    fn persisted(id: i64, key: SlotKey, volunteers: Vec<VolunteerRef>) -> Assignment {
        Assignment {
            id,
            date: key.date,
            slot_id: key.slot_id,
            station_id: key.station_id,
            volunteers,
        }
    }

    fn ids(ledger: &AssignmentLedger, key: &SlotKey) -> Vec<i64> {
        ledger
            .effective_assignments(key)
            .iter()
            .map(|e| e.volunteer.id)
            .collect()
    }

    #[test]
    fn test_effective_merges_persisted_and_pending() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(100, key, vec![volunteer(1, Gender::Male)])],
            ManualOverrides::default(),
        );

        ledger.add_pending(key, volunteer(2, Gender::Female)).unwrap();
        assert_eq!(ids(&ledger, &key), vec![1, 2]);

        ledger
            .remove_pending(AssignmentRef::Persisted(100), 1)
            .unwrap();
        assert_eq!(ids(&ledger, &key), vec![2]);
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(100, key, vec![volunteer(1, Gender::Male)])],
            ManualOverrides::default(),
        );

        let persisted_dup = ledger.add_pending(key, volunteer(1, Gender::Male));
        assert!(matches!(
            persisted_dup,
            Err(Error::AlreadyAssigned { volunteer_id: 1, .. })
        ));

        ledger.add_pending(key, volunteer(2, Gender::Female)).unwrap();
        let pending_dup = ledger.add_pending(key, volunteer(2, Gender::Female));
        assert!(matches!(
            pending_dup,
            Err(Error::AlreadyAssigned { volunteer_id: 2, .. })
        ));
        assert_eq!(ledger.pending_additions().len(), 1);
    }

    #[test]
    fn test_add_clears_override_and_remove_sets_it() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(Vec::new(), ManualOverrides::new([key]));

        ledger.add_pending(key, volunteer(2, Gender::Female)).unwrap();
        assert!(!ledger.overrides().contains(&key));

        let owner = ledger
            .remove_pending(AssignmentRef::Pending(key), 2)
            .unwrap();
        assert_eq!(owner, key);
        assert!(ledger.overrides().contains(&key));
        assert!(ledger.pending_additions().is_empty());
    }

    #[test]
    fn test_readding_removed_volunteer_cancels_removal() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(100, key, vec![volunteer(1, Gender::Male)])],
            ManualOverrides::default(),
        );

        ledger
            .remove_pending(AssignmentRef::Persisted(100), 1)
            .unwrap();
        assert!(ledger.has_pending_removal(&key));

        let outcome = ledger.add_pending(key, volunteer(1, Gender::Male)).unwrap();
        assert_eq!(outcome, AddOutcome::RemovalCanceled);
        assert!(!ledger.has_pending_changes());
        assert_eq!(ids(&ledger, &key), vec![1]);
    }

    #[test]
    fn test_remove_unknown_target_is_rejected() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(100, key, vec![volunteer(1, Gender::Male)])],
            ManualOverrides::default(),
        );

        assert!(matches!(
            ledger.remove_pending(AssignmentRef::Persisted(100), 7),
            Err(Error::NotAssigned { volunteer_id: 7, .. })
        ));
        assert!(matches!(
            ledger.remove_pending(AssignmentRef::Persisted(999), 1),
            Err(Error::NotAssigned { .. })
        ));
        assert!(matches!(
            ledger.remove_pending(AssignmentRef::Pending(key), 1),
            Err(Error::NotAssigned { .. })
        ));
        assert!(ledger.overrides().is_empty());
    }

    #[test]
    fn test_second_removal_of_same_volunteer_is_rejected() {
        let key = SlotKey::new(june(2), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(
                100,
                key,
                vec![volunteer(1, Gender::Male), volunteer(2, Gender::Female)],
            )],
            ManualOverrides::default(),
        );

        ledger
            .remove_pending(AssignmentRef::Persisted(100), 1)
            .unwrap();
        ledger.add_pending(key, volunteer(3, Gender::Female)).unwrap();
        assert!(!ledger.overrides().contains(&key));

        assert!(matches!(
            ledger.remove_pending(AssignmentRef::Persisted(100), 1),
            Err(Error::NotAssigned { volunteer_id: 1, .. })
        ));
        assert!(!ledger.overrides().contains(&key));
        assert_eq!(ledger.pending_removals(), vec![(100, 1)]);
        assert_eq!(ids(&ledger, &key), vec![2, 3]);
    }

    #[test]
    fn test_last_assignment_date_spans_period() {
        let early = SlotKey::new(june(2), 10, 1);
        let late = SlotKey::new(june(16), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(100, early, vec![volunteer(1, Gender::Male)])],
            ManualOverrides::default(),
        );
        assert_eq!(ledger.last_assignment_date(1), Some(june(2)));
        assert_eq!(ledger.last_assignment_date(2), None);

        ledger.add_pending(late, volunteer(1, Gender::Male)).unwrap();
        assert_eq!(ledger.last_assignment_date(1), Some(june(16)));

        ledger
            .remove_pending(AssignmentRef::Persisted(100), 1)
            .unwrap();
        ledger
            .remove_pending(AssignmentRef::Pending(late), 1)
            .unwrap();
        assert_eq!(ledger.last_assignment_date(1), None);
    }

    #[test]
    fn test_clear_pending_keeps_overrides() {
        let key = SlotKey::new(june(2), 10, 1);
        let other = SlotKey::new(june(3), 10, 1);
        let mut ledger = AssignmentLedger::new(Vec::new(), ManualOverrides::new([other]));
        ledger.add_pending(key, volunteer(1, Gender::Male)).unwrap();

        ledger.clear_pending();
        ledger.reseed(vec![persisted(200, key, vec![volunteer(1, Gender::Male)])]);

        assert!(!ledger.has_pending_changes());
        assert!(ledger.overrides().contains(&other));
        assert_eq!(ids(&ledger, &key), vec![1]);
    }

    #[test]
    fn test_volunteer_loads_counts_effective_only() {
        let a = SlotKey::new(june(2), 10, 1);
        let b = SlotKey::new(june(3), 10, 1);
        let mut ledger = AssignmentLedger::new(
            vec![persisted(
                100,
                a,
                vec![volunteer(1, Gender::Male), volunteer(2, Gender::Female)],
            )],
            ManualOverrides::default(),
        );
        ledger.add_pending(b, volunteer(1, Gender::Male)).unwrap();
        ledger
            .remove_pending(AssignmentRef::Persisted(100), 2)
            .unwrap();

        let loads = ledger.volunteer_loads();
        assert_eq!(loads.get(&1), Some(&2));
        assert_eq!(loads.get(&2), None);
    }
}
