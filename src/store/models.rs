use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::FaceId;

pub type ActivityId = i64;
pub type IntervalId = i64;

/// A label assigned to a face at a point in time. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub id: ActivityId,
    pub date_added: DateTime<Utc>,
    pub face: FaceId,
    pub label: String,
}

/// One contiguous period during which an activity was current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInterval {
    pub id: IntervalId,
    pub start: DateTime<Utc>,
    /// `None` while the interval is still open
    pub finish: Option<DateTime<Utc>>,
    pub activity_id: ActivityId,
}

impl ActivityInterval {
    pub fn is_open(&self) -> bool {
        self.finish.is_none()
    }
}

/// An interval joined with the definition it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub interval: ActivityInterval,
    /// Missing when the referenced definition no longer exists
    pub face: Option<FaceId>,
    pub label: Option<String>,
}
