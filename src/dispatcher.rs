//! Face change dispatcher.
//!
//! Feeds face readings into the ledger one at a time, in arrival order, with
//! the previously seen face as the transition's origin.

use crossbeam_channel::Receiver;

use crate::catalog::EffectiveActivitySet;
use crate::device::FaceId;
use crate::ledger::{IntervalLedger, LedgerEffect};
use crate::store::StoreError;

/// Tracks the current face between readings.
#[derive(Debug, Clone)]
pub struct FaceChangeDispatcher {
    current: FaceId,
    readings: u64,
}

impl Default for FaceChangeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceChangeDispatcher {
    /// Start with no prior activity.
    pub fn new() -> Self {
        Self {
            current: FaceId::SENTINEL,
            readings: 0,
        }
    }

    /// The face the last successfully applied reading reported.
    pub fn current_face(&self) -> FaceId {
        self.current
    }

    /// Number of readings applied so far.
    pub fn readings(&self) -> u64 {
        self.readings
    }

    /// Apply one reading. The current face only advances when the ledger
    /// write succeeded.
    pub fn dispatch(
        &mut self,
        face: FaceId,
        ledger: &mut IntervalLedger,
        activities: &EffectiveActivitySet,
    ) -> Result<LedgerEffect, StoreError> {
        let effect = ledger.transition(self.current, face, activities)?;
        tracing::debug!(from = %self.current, to = %face, noop = effect.is_noop(), "Face reading applied");
        self.current = face;
        self.readings += 1;
        Ok(effect)
    }

    /// Apply every reading already queued on `notifications` without blocking.
    pub fn drain(
        &mut self,
        notifications: &Receiver<FaceId>,
        ledger: &mut IntervalLedger,
        activities: &EffectiveActivitySet,
    ) -> Result<usize, StoreError> {
        let mut applied = 0;
        while let Ok(face) = notifications.try_recv() {
            self.dispatch(face, ledger, activities)?;
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::Store;
    use crossbeam_channel::unbounded;

    fn ledger() -> (IntervalLedger, EffectiveActivitySet) {
        let store = Store::open_in_memory().unwrap();
        store.insert_activity(FaceId(2), "Dev", 1).unwrap();
        store.insert_activity(FaceId(5), "Meeting", 1).unwrap();
        let activities = EffectiveActivitySet::load(&store).unwrap();
        (
            IntervalLedger::new(store, ManualClock::starting_at(100)),
            activities,
        )
    }

    #[test]
    fn test_starts_at_sentinel() {
        let dispatcher = FaceChangeDispatcher::new();
        assert_eq!(dispatcher.current_face(), FaceId::SENTINEL);
        assert_eq!(dispatcher.readings(), 0);
    }

    #[test]
    fn test_dispatch_advances_current_face() {
        let (mut ledger, activities) = ledger();
        let mut dispatcher = FaceChangeDispatcher::new();

        dispatcher.dispatch(FaceId(2), &mut ledger, &activities).unwrap();
        assert_eq!(dispatcher.current_face(), FaceId(2));

        let effect = dispatcher.dispatch(FaceId(2), &mut ledger, &activities).unwrap();
        assert!(effect.is_noop());
        assert_eq!(dispatcher.readings(), 2);
    }

    #[test]
    fn test_drain_preserves_order() {
        let (mut ledger, activities) = ledger();
        let mut dispatcher = FaceChangeDispatcher::new();
        let (sender, receiver) = unbounded();
        for raw in [2, 5, 2] {
            sender.send(FaceId(raw)).unwrap();
        }

        let applied = dispatcher.drain(&receiver, &mut ledger, &activities).unwrap();
        assert_eq!(applied, 3);
        assert_eq!(dispatcher.current_face(), FaceId(2));

        let intervals = ledger.store().intervals().unwrap();
        let ids: Vec<i64> = intervals.iter().map(|i| i.activity_id).collect();
        let dev = activities.get(FaceId(2)).unwrap().id;
        let meeting = activities.get(FaceId(5)).unwrap().id;
        assert_eq!(ids, vec![dev, meeting, dev]);
    }

    #[test]
    fn test_failed_write_keeps_previous_face() {
        let (mut ledger, activities) = ledger();
        let mut dispatcher = FaceChangeDispatcher::new();
        dispatcher.dispatch(FaceId(2), &mut ledger, &activities).unwrap();

        ledger
            .store()
            .connection()
            .execute_batch("DROP TABLE activity_events;")
            .unwrap();

        assert!(dispatcher
            .dispatch(FaceId(5), &mut ledger, &activities)
            .is_err());
        assert_eq!(dispatcher.current_face(), FaceId(2));
        assert_eq!(dispatcher.readings(), 1);
    }
}
