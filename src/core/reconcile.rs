//! Reconciliation driver - flushes the ledger's pending overlays into the store.
//!
//! Removals go out first as one concurrent batch, then additions as a second batch, so a
//! volunteer can be detached before being attached elsewhere in the same flush. Within a
//! batch every call runs on its own tokio task and a failing call never cancels its siblings.
//! On any failure the overlays are kept intact so the operator can simply save again; the
//! store treats repeated creations and removals as no-ops, which makes such retries safe.

use crate::{
    core::{
        ledger::AssignmentLedger,
        model::{Period, SlotKey},
        store::{CreateOutcome, RemoveOutcome, SchedulingStore},
    },
    errors::{Error, Result},
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Number of failure messages quoted in the aggregate error.
const SUMMARY_SAMPLE: usize = 3;

/// The store call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOp {
    Remove { assignment_id: i64, volunteer_id: i64 },
    Create { key: SlotKey, volunteer_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushFailure {
    pub op: FlushOp,
    pub message: String,
}

/// Per-call accounting of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Volunteers detached from persisted assignments.
    pub removed: usize,
    /// Assignments created.
    pub created: usize,
    /// Additions or removals the store already reflected; counted as success.
    pub already_applied: usize,
    pub failures: Vec<FlushFailure>,
}

impl FlushReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Store calls issued (or skipped as already applied).
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.removed + self.created + self.already_applied + self.failures.len()
    }

    fn record_failure(&mut self, op: FlushOp, message: String) {
        error!("Failed to apply {:?}: {}", op, message);
        self.failures.push(FlushFailure { op, message });
    }

    /// Converts a report with failures into [`Error::FlushFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let mut summary = self
            .failures
            .iter()
            .take(SUMMARY_SAMPLE)
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let more = self.failures.len().saturating_sub(SUMMARY_SAMPLE);
        if more > 0 {
            // Writing into a String cannot fail.
            let _ = write!(summary, "; and {more} more");
        }

        Err(Error::FlushFailed {
            failed: self.failures.len(),
            attempted: self.attempted(),
            summary,
        })
    }
}

/// Collects every task of a batch. `ops[i]` is the call spawned with index `i`.
///
/// A task that panicked or was cancelled never reports its index, so whatever ops are still
/// outstanding once the set is drained are paired with the join errors seen.
async fn drain<T>(
    mut batch: JoinSet<(usize, Result<T>)>,
    ops: &[FlushOp],
) -> Vec<(FlushOp, std::result::Result<T, String>)>
where
    T: Send + 'static,
{
    let mut outstanding: BTreeSet<usize> = (0..ops.len()).collect();
    let mut task_errors = Vec::new();
    let mut results = Vec::with_capacity(ops.len());

    while let Some(joined) = batch.join_next().await {
        match joined {
            Ok((idx, result)) => {
                outstanding.remove(&idx);
                results.push((ops[idx], result.map_err(|e| e.to_string())));
            }
            Err(e) => task_errors.push(Error::from(e).to_string()),
        }
    }

    let mut task_errors = task_errors.into_iter();
    for idx in outstanding {
        let message = task_errors
            .next()
            .unwrap_or_else(|| "store task ended without a result".to_string());
        results.push((ops[idx], Err(message)));
    }
    results
}

/// Writes the ledger's pending overlays to the store.
///
/// Pending additions are re-validated against a fresh read of the period: a volunteer that
/// became persisted in the meantime is skipped as already applied. Every store call ends up
/// in the report, including calls whose task panicked; a failed re-read marks all additions
/// as failed. On full success both overlays are cleared; the caller is expected to re-seed
/// the ledger from the store.
pub async fn flush<S>(
    store: &Arc<S>,
    period: &Period,
    ledger: &mut AssignmentLedger,
) -> Result<FlushReport>
where
    S: SchedulingStore,
{
    let mut report = FlushReport::default();

    let removals = ledger.pending_removals();
    if !removals.is_empty() {
        let mut ops = Vec::with_capacity(removals.len());
        let mut batch = JoinSet::new();
        for (idx, (assignment_id, volunteer_id)) in removals.into_iter().enumerate() {
            ops.push(FlushOp::Remove {
                assignment_id,
                volunteer_id,
            });
            let store = Arc::clone(store);
            batch.spawn(async move {
                (idx, store.remove_volunteer(assignment_id, volunteer_id).await)
            });
        }

        for (op, result) in drain(batch, &ops).await {
            match result {
                Ok(RemoveOutcome::Removed { .. }) => report.removed += 1,
                Ok(RemoveOutcome::AlreadyAbsent) => report.already_applied += 1,
                Err(message) => report.record_failure(op, message),
            }
        }
    }

    let additions = ledger.pending_additions();
    if !additions.is_empty() {
        let mut wanted: BTreeMap<SlotKey, BTreeSet<i64>> = BTreeMap::new();
        for addition in additions {
            wanted
                .entry(addition.key)
                .or_default()
                .insert(addition.volunteer.id);
        }

        match store.assignments(*period).await {
            Ok(persisted) => {
                let mut ops = Vec::new();
                let mut batch = JoinSet::new();
                for (key, volunteer_ids) in wanted {
                    for volunteer_id in volunteer_ids {
                        let already = persisted
                            .iter()
                            .any(|a| a.key() == key && a.has_volunteer(volunteer_id));
                        if already {
                            report.already_applied += 1;
                            continue;
                        }

                        let idx = ops.len();
                        ops.push(FlushOp::Create { key, volunteer_id });
                        let store = Arc::clone(store);
                        batch.spawn(async move {
                            (idx, store.create_assignment(key, volunteer_id).await)
                        });
                    }
                }

                for (op, result) in drain(batch, &ops).await {
                    match result {
                        Ok(CreateOutcome::Created { .. }) => report.created += 1,
                        Ok(CreateOutcome::AlreadyPresent { .. }) => report.already_applied += 1,
                        Err(message) => report.record_failure(op, message),
                    }
                }
            }
            Err(e) => {
                let message = format!("could not re-read assignments: {e}");
                for (key, volunteer_ids) in wanted {
                    for volunteer_id in volunteer_ids {
                        let op = FlushOp::Create { key, volunteer_id };
                        report.record_failure(op, message.clone());
                    }
                }
            }
        }
    }

    if report.is_success() {
        ledger.clear_pending();
        info!(
            "Flushed {}: {} created, {} removed, {} already applied",
            period, report.created, report.removed, report.already_applied
        );
    } else {
        error!(
            "Flush of {} incomplete: {} of {} change(s) failed; pending changes kept for retry",
            period,
            report.failures.len(),
            report.attempted()
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        ledger::AssignmentRef,
        model::{Gender, VolunteerRef},
        overrides::ManualOverrides,
    };
    use crate::test_utils::*;

    fn volunteer_ref(model: &crate::entities::VolunteerModel, gender: Gender) -> VolunteerRef {
        VolunteerRef {
            id: model.id,
            name: model.name.clone(),
            gender,
        }
    }

    #[tokio::test]
    async fn test_flush_creates_and_clears_overlays() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let alice = create_test_volunteer(store.connection(), "Alice", Gender::Female).await?;
        let key = fixture.key(monday());

        let mut ledger = AssignmentLedger::default();
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;
        ledger.add_pending(key, volunteer_ref(&alice, Gender::Female))?;

        let store = Arc::new(store);
        let report = flush(&store, &june_period(), &mut ledger).await?;

        assert!(report.is_success());
        assert_eq!(report.created, 2);
        assert!(!ledger.has_pending_changes());

        let persisted = store.assignments(june_period()).await?;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].volunteers.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_removes_before_adding() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let carol = create_test_volunteer(store.connection(), "Carol", Gender::Female).await?;
        let key = fixture.key(monday());
        store.create_assignment(key, carol.id).await?;

        let mut ledger =
            AssignmentLedger::new(store.assignments(june_period()).await?, ManualOverrides::default());
        let assignment_id = ledger.persisted()[0].id;
        ledger.remove_pending(AssignmentRef::Persisted(assignment_id), carol.id)?;
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;

        let store = Arc::new(store);
        let report = flush(&store, &june_period(), &mut ledger).await?;
        assert_eq!(report.removed, 1);
        assert_eq!(report.created, 1);

        let persisted = store.assignments(june_period()).await?;
        let ids: Vec<i64> = persisted
            .iter()
            .flat_map(|a| a.volunteers.iter().map(|v| v.id))
            .collect();
        assert_eq!(ids, vec![bob.id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_skips_additions_persisted_by_a_race() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let key = fixture.key(monday());

        let mut ledger = AssignmentLedger::default();
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;
        // Someone else saved the same tuple after our snapshot.
        store.create_assignment(key, bob.id).await?;

        let store = Arc::new(store);
        let report = flush(&store, &june_period(), &mut ledger).await?;
        assert!(report.is_success());
        assert_eq!(report.created, 0);
        assert_eq!(report.already_applied, 1);
        assert_eq!(store.assignments(june_period()).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_calls_keep_overlays_and_siblings_run() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let alice = create_test_volunteer(store.connection(), "Alice", Gender::Female).await?;
        let key = fixture.key(monday());

        let mut ledger = AssignmentLedger::default();
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;
        ledger.add_pending(key, volunteer_ref(&alice, Gender::Female))?;

        let flaky = Arc::new(FailingStore::new(store, [alice.id]));
        let report = flush(&flaky, &june_period(), &mut ledger).await?;

        assert!(!report.is_success());
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].op,
            FlushOp::Create {
                key,
                volunteer_id: alice.id
            }
        );
        assert_eq!(ledger.pending_additions().len(), 2);

        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            Error::FlushFailed {
                failed: 1,
                attempted: 2,
                ..
            }
        ));

        // Retry once the backend recovers: Bob is already there, Alice gets created.
        flaky.heal();
        let retry = flush(&flaky, &june_period(), &mut ledger).await?;
        assert!(retry.is_success());
        assert_eq!(retry.created, 1);
        assert_eq!(retry.already_applied, 1);
        assert!(!ledger.has_pending_changes());
        Ok(())
    }

    #[tokio::test]
    async fn test_panicking_create_is_reported_not_raised() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let alice = create_test_volunteer(store.connection(), "Alice", Gender::Female).await?;
        let key = fixture.key(monday());

        let mut ledger = AssignmentLedger::default();
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;
        ledger.add_pending(key, volunteer_ref(&alice, Gender::Female))?;

        let crashing =
            Arc::new(FailingStore::new(store, std::iter::empty()).with_panic_on(alice.id));
        let report = flush(&crashing, &june_period(), &mut ledger).await?;

        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].op,
            FlushOp::Create {
                key,
                volunteer_id: alice.id
            }
        );
        assert!(report.failures[0].message.contains("panicked"));
        assert_eq!(ledger.pending_additions().len(), 2);

        crashing.heal();
        let retry = flush(&crashing, &june_period(), &mut ledger).await?;
        assert!(retry.is_success());
        assert_eq!(retry.created, 1);
        assert_eq!(retry.already_applied, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reread_fails_every_addition() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let carol = create_test_volunteer(store.connection(), "Carol", Gender::Female).await?;
        let key = fixture.key(monday());
        store.create_assignment(key, carol.id).await?;

        let mut ledger =
            AssignmentLedger::new(store.assignments(june_period()).await?, ManualOverrides::default());
        let assignment_id = ledger.persisted()[0].id;
        ledger.remove_pending(AssignmentRef::Persisted(assignment_id), carol.id)?;
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;

        let flaky = Arc::new(FailingStore::new(store, std::iter::empty()));
        flaky.fail_reads();
        let report = flush(&flaky, &june_period(), &mut ledger).await?;

        assert_eq!(report.removed, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].op,
            FlushOp::Create {
                key,
                volunteer_id: bob.id
            }
        );
        assert!(report.failures[0].message.contains("could not re-read"));
        // Only the removal reached the store.
        assert_eq!(flaky.calls(), 1);
        assert!(ledger.has_pending_changes());

        flaky.heal();
        let retry = flush(&flaky, &june_period(), &mut ledger).await?;
        assert!(retry.is_success());
        assert_eq!(retry.created, 1);
        assert_eq!(retry.already_applied, 1);
        assert!(!ledger.has_pending_changes());
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_after_reseed_issues_no_calls() -> Result<()> {
        let (store, fixture) = setup_plaza().await?;
        let bob = create_test_volunteer(store.connection(), "Bob", Gender::Male).await?;
        let key = fixture.key(monday());

        let mut ledger = AssignmentLedger::default();
        ledger.add_pending(key, volunteer_ref(&bob, Gender::Male))?;

        let counting = Arc::new(FailingStore::new(store, std::iter::empty()));
        let first = flush(&counting, &june_period(), &mut ledger).await?;
        assert_eq!(first.created, 1);
        let calls = counting.calls();
        assert_eq!(calls, 1);

        ledger.reseed(counting.assignments(june_period()).await?);
        let second = flush(&counting, &june_period(), &mut ledger).await?;

        assert_eq!(second, FlushReport::default());
        assert_eq!(counting.calls(), calls);
        Ok(())
    }

    #[test]
    fn test_into_result_summarizes_failures() {
        let key = SlotKey::new(monday(), 10, 1);
        let report = FlushReport {
            created: 1,
            failures: (1..=5)
                .map(|id| FlushFailure {
                    op: FlushOp::Create {
                        key,
                        volunteer_id: id,
                    },
                    message: format!("boom {id}"),
                })
                .collect(),
            ..FlushReport::default()
        };

        let Err(Error::FlushFailed {
            failed,
            attempted,
            summary,
        }) = report.into_result()
        else {
            unreachable!("a report with failures must not convert to Ok");
        };
        assert_eq!(failed, 5);
        assert_eq!(attempted, 6);
        assert_eq!(summary, "boom 1; boom 2; boom 3; and 2 more");
    }
}
