//! Interval ledger: turns face transitions into closed and opened intervals.
//!
//! Each call to [`IntervalLedger::transition`] resolves the old and new faces
//! through the effective activity set, closes the most recent open interval of
//! the old activity and opens one for the new activity. Both writes go through
//! a single transaction, so a failure leaves the previous state untouched and
//! at most one interval is ever open.

use chrono::{DateTime, Local, Utc};
use std::time::Duration;

use crate::catalog::EffectiveActivitySet;
use crate::clock::Clock;
use crate::device::FaceId;
use crate::store::{ActivityDefinition, Store, StoreError, TransitionOutcome, TransitionStep};

/// Optional rules applied on top of the plain ledger contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Intervals shorter than this are dropped when they close
    pub min_activity_length: Option<Duration>,
}

/// A transition that touched storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    pub at: DateTime<Utc>,
    pub from: Option<ActivityDefinition>,
    pub to: Option<ActivityDefinition>,
    pub outcome: TransitionOutcome,
}

impl AppliedTransition {
    /// Human-readable description, in local time.
    pub fn describe(&self) -> String {
        let at = self
            .at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S");
        let from = self.from.as_ref().map(|a| a.label.as_str()).unwrap_or("nothing");
        match &self.to {
            Some(to) => format!("Changed activity from {from} to {} at {at}", to.label),
            None => format!("Finished doing {from} at {at} - no current activity"),
        }
    }
}

/// Result of one ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Neither face maps to an activity, or both map to the same one
    NoOp,
    Applied(AppliedTransition),
}

impl LedgerEffect {
    pub fn is_noop(&self) -> bool {
        matches!(self, LedgerEffect::NoOp)
    }
}

/// Owns the database and the clock used to stamp intervals.
pub struct IntervalLedger {
    store: Store,
    clock: Box<dyn Clock>,
    policy: LedgerPolicy,
}

impl IntervalLedger {
    pub fn new(store: Store, clock: impl Clock + 'static) -> Self {
        Self {
            store,
            clock: Box::new(clock),
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Apply the transition `old -> new`.
    pub fn transition(
        &mut self,
        old: FaceId,
        new: FaceId,
        activities: &EffectiveActivitySet,
    ) -> Result<LedgerEffect, StoreError> {
        let from = activities.get(old);
        let to = activities.get(new);

        let same_activity = match (from, to) {
            (None, None) => true,
            (Some(a), Some(b)) => a.id == b.id,
            _ => false,
        };
        if old == new || same_activity {
            return Ok(LedgerEffect::NoOp);
        }

        let at = self.clock.now();
        let step = TransitionStep {
            close: from.map(|a| a.id),
            open: to.map(|a| a.id),
            at: at.timestamp(),
            min_length_secs: self
                .policy
                .min_activity_length
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
        };
        let outcome = self.store.apply_transition(&step)?;

        let applied = AppliedTransition {
            at,
            from: from.cloned(),
            to: to.cloned(),
            outcome,
        };

        tracing::info!(
            from = %old,
            to = %new,
            closed = ?outcome.closed.map(|c| c.id),
            opened = ?outcome.opened,
            "{}",
            applied.describe()
        );
        if let Some(closed) = outcome.closed.filter(|c| c.discarded) {
            tracing::info!(
                interval = closed.id,
                duration_secs = closed.duration_secs(),
                "Dropped interval shorter than the minimum activity length"
            );
        }

        Ok(LedgerEffect::Applied(applied))
    }

    /// Close intervals left open by a session that ended abruptly.
    pub fn recover_open_intervals(&mut self) -> Result<usize, StoreError> {
        let at = self.clock.now().timestamp();
        let closed = self.store.close_open_intervals(at)?;
        if closed > 0 {
            tracing::warn!(count = closed, "Closed intervals left open by a previous session");
        }
        Ok(closed)
    }
}
