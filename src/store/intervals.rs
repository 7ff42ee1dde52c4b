use rusqlite::{params, OptionalExtension, Row};

use super::{
    to_datetime, ActivityId, ActivityInterval, IntervalId, IntervalRecord, Store, StoreError,
};
use crate::device::FaceId;

/// One close/open pair to apply atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionStep {
    /// Activity whose most recent open interval should be closed
    pub close: Option<ActivityId>,
    /// Activity to open a new interval for
    pub open: Option<ActivityId>,
    /// Transition time, epoch seconds
    pub at: i64,
    /// Closed intervals shorter than this are deleted instead of kept
    pub min_length_secs: Option<i64>,
}

/// An interval closed by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedInterval {
    pub id: IntervalId,
    pub start: i64,
    pub finish: i64,
    /// Removed because it was shorter than the minimum length
    pub discarded: bool,
}

impl ClosedInterval {
    pub fn duration_secs(&self) -> i64 {
        self.finish - self.start
    }
}

/// What a transition changed in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionOutcome {
    pub closed: Option<ClosedInterval>,
    pub opened: Option<IntervalId>,
}

struct IntervalRow {
    id: i64,
    start_time: i64,
    finish_time: Option<i64>,
    activity_id: i64,
}

fn read_interval_row(row: &Row) -> Result<IntervalRow, rusqlite::Error> {
    Ok(IntervalRow {
        id: row.get("id")?,
        start_time: row.get("start_time")?,
        finish_time: row.get("finish_time")?,
        activity_id: row.get("activity_id")?,
    })
}

impl TryFrom<IntervalRow> for ActivityInterval {
    type Error = StoreError;

    fn try_from(row: IntervalRow) -> Result<Self, StoreError> {
        Ok(ActivityInterval {
            id: row.id,
            start: to_datetime(row.start_time, "start_time")?,
            finish: row
                .finish_time
                .map(|value| to_datetime(value, "finish_time"))
                .transpose()?,
            activity_id: row.activity_id,
        })
    }
}

impl Store {
    /// Close the most recent open interval for `step.close` and open a new
    /// one for `step.open`, as one transaction. On error nothing is applied.
    pub fn apply_transition(&mut self, step: &TransitionStep) -> Result<TransitionOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let mut outcome = TransitionOutcome::default();

        if let Some(activity_id) = step.close {
            let closed: Option<(i64, i64, i64)> = tx
                .query_row(
                    "UPDATE activity_events SET finish_time = MAX(start_time, ?1)
                     WHERE id = (
                         SELECT id FROM activity_events
                         WHERE finish_time IS NULL AND activity_id = ?2
                         ORDER BY start_time DESC, id DESC
                         LIMIT 1)
                     RETURNING id, start_time, finish_time",
                    params![step.at, activity_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            // A clock that stepped back closes the interval at its own start.
            if let Some((id, start, finish)) = closed {
                let too_short = step
                    .min_length_secs
                    .map(|min| finish - start < min)
                    .unwrap_or(false);
                if too_short {
                    tx.execute("DELETE FROM activity_events WHERE id = ?1", params![id])?;
                }
                outcome.closed = Some(ClosedInterval {
                    id,
                    start,
                    finish,
                    discarded: too_short,
                });
            }
        }

        if let Some(activity_id) = step.open {
            tx.execute(
                "INSERT INTO activity_events (start_time, finish_time, activity_id) VALUES (?1, NULL, ?2)",
                params![step.at, activity_id],
            )?;
            outcome.opened = Some(tx.last_insert_rowid());
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Intervals with no finish time, most recent first.
    pub fn open_intervals(&self) -> Result<Vec<ActivityInterval>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, finish_time, activity_id FROM activity_events
             WHERE finish_time IS NULL
             ORDER BY start_time DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([], read_interval_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ActivityInterval::try_from).collect()
    }

    /// All intervals in start order.
    pub fn intervals(&self) -> Result<Vec<ActivityInterval>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, finish_time, activity_id FROM activity_events
             ORDER BY start_time, id",
        )?;
        let rows = stmt
            .query_map([], read_interval_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ActivityInterval::try_from).collect()
    }

    /// Close every open interval at `at` (never before its own start).
    /// Returns the number of intervals closed.
    pub fn close_open_intervals(&mut self, at: i64) -> Result<usize, StoreError> {
        let closed = self.conn.execute(
            "UPDATE activity_events SET finish_time = MAX(start_time, ?1) WHERE finish_time IS NULL",
            params![at],
        )?;
        Ok(closed)
    }

    /// Intervals joined with their definitions, optionally starting at or after `since`.
    pub fn interval_records(&self, since: Option<i64>) -> Result<Vec<IntervalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.start_time, e.finish_time, e.activity_id, a.face_id, a.activity_string
             FROM activity_events e
             LEFT JOIN activities a ON a.id = e.activity_id
             WHERE ?1 IS NULL OR e.start_time >= ?1
             ORDER BY e.start_time, e.id",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                let interval = read_interval_row(row)?;
                let face: Option<i64> = row.get("face_id")?;
                let label: Option<String> = row.get("activity_string")?;
                Ok((interval, face, label))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(interval, face, label)| {
                let face = face
                    .map(|value| {
                        i8::try_from(value)
                            .map(FaceId)
                            .map_err(|_| StoreError::InvalidValue {
                                field: "face_id",
                                value,
                            })
                    })
                    .transpose()?;
                Ok(IntervalRecord {
                    interval: ActivityInterval::try_from(interval)?,
                    face,
                    label,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(close: Option<ActivityId>, open: Option<ActivityId>, at: i64) -> TransitionStep {
        TransitionStep {
            close,
            open,
            at,
            min_length_secs: None,
        }
    }

    #[test]
    fn test_open_then_close() {
        let mut store = Store::open_in_memory().unwrap();

        let opened = store.apply_transition(&step(None, Some(7), 100)).unwrap();
        assert!(opened.closed.is_none());
        let id = opened.opened.unwrap();
        assert_eq!(store.open_intervals().unwrap().len(), 1);

        let closed = store.apply_transition(&step(Some(7), None, 160)).unwrap();
        let interval = closed.closed.unwrap();
        assert_eq!(interval.id, id);
        assert_eq!(interval.duration_secs(), 60);
        assert!(!interval.discarded);
        assert!(store.open_intervals().unwrap().is_empty());
    }

    #[test]
    fn test_close_without_open_interval_is_noop() {
        let mut store = Store::open_in_memory().unwrap();
        let outcome = store.apply_transition(&step(Some(3), None, 100)).unwrap();
        assert_eq!(outcome, TransitionOutcome::default());
        assert!(store.intervals().unwrap().is_empty());
    }

    #[test]
    fn test_close_targets_most_recent_open_interval() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO activity_events (start_time, finish_time, activity_id) VALUES (10, NULL, 1);
                 INSERT INTO activity_events (start_time, finish_time, activity_id) VALUES (50, NULL, 1);",
            )
            .unwrap();

        let outcome = store.apply_transition(&step(Some(1), None, 90)).unwrap();
        assert_eq!(outcome.closed.unwrap().start, 50);

        let open = store.open_intervals().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].start.timestamp(), 10);
    }

    #[test]
    fn test_short_interval_is_discarded_under_minimum() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply_transition(&step(None, Some(1), 100)).unwrap();

        let outcome = store
            .apply_transition(&TransitionStep {
                close: Some(1),
                open: Some(2),
                at: 130,
                min_length_secs: Some(300),
            })
            .unwrap();

        assert!(outcome.closed.unwrap().discarded);
        let all = store.intervals().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].activity_id, 2);
        assert!(all[0].is_open());
    }

    #[test]
    fn test_failed_open_rolls_back_close() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply_transition(&step(None, Some(1), 100)).unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON activity_events
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let result = store.apply_transition(&step(Some(1), Some(2), 200));
        assert!(result.is_err());

        let open = store.open_intervals().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].activity_id, 1);
    }

    #[test]
    fn test_close_before_start_is_clamped_to_start() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply_transition(&step(None, Some(1), 10_000)).unwrap();

        let outcome = store.apply_transition(&step(Some(1), Some(2), 9_000)).unwrap();
        let closed = outcome.closed.unwrap();
        assert_eq!(closed.finish, 10_000);
        assert_eq!(closed.duration_secs(), 0);
        assert!(!closed.discarded);

        let all = store.intervals().unwrap();
        let first = all.iter().find(|i| i.id == closed.id).unwrap();
        assert_eq!(first.finish.unwrap(), first.start);
    }

    #[test]
    fn test_close_open_intervals_never_precedes_start() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply_transition(&step(None, Some(1), 500)).unwrap();

        assert_eq!(store.close_open_intervals(400).unwrap(), 1);
        let all = store.intervals().unwrap();
        assert_eq!(all[0].finish.unwrap().timestamp(), 500);
        assert_eq!(store.close_open_intervals(600).unwrap(), 0);
    }

    #[test]
    fn test_interval_records_join_labels() {
        let mut store = Store::open_in_memory().unwrap();
        let dev = store.insert_activity(FaceId(2), "Dev", 1).unwrap();
        store.apply_transition(&step(None, Some(dev.id), 100)).unwrap();
        store.apply_transition(&step(Some(dev.id), None, 200)).unwrap();
        store.apply_transition(&step(None, Some(999), 300)).unwrap();

        let records = store.interval_records(None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label.as_deref(), Some("Dev"));
        assert_eq!(records[0].face, Some(FaceId(2)));
        assert_eq!(records[1].label, None);

        let recent = store.interval_records(Some(250)).unwrap();
        assert_eq!(recent.len(), 1);
    }
}
