use rusqlite::{params, Row};

use super::{to_datetime, ActivityDefinition, Store, StoreError};
use crate::device::FaceId;

// Legacy databases have no NOT NULL constraints, so every column may be empty.
struct ActivityRow {
    id: i64,
    date_added: Option<i64>,
    face_id: Option<i64>,
    label: Option<String>,
}

fn read_activity_row(row: &Row) -> Result<ActivityRow, rusqlite::Error> {
    Ok(ActivityRow {
        id: row.get("id")?,
        date_added: row.get("date_added")?,
        face_id: row.get("face_id")?,
        label: row.get("activity_string")?,
    })
}

impl ActivityRow {
    /// `None` for rows with a missing column.
    fn into_definition(self) -> Result<Option<ActivityDefinition>, StoreError> {
        let (Some(date_added), Some(face_id), Some(label)) =
            (self.date_added, self.face_id, self.label)
        else {
            tracing::warn!(id = self.id, "Skipping incomplete activity definition");
            return Ok(None);
        };
        let face = i8::try_from(face_id).map_err(|_| StoreError::InvalidValue {
            field: "face_id",
            value: face_id,
        })?;
        Ok(Some(ActivityDefinition {
            id: self.id,
            date_added: to_datetime(date_added, "date_added")?,
            face: FaceId(face),
            label,
        }))
    }
}

impl Store {
    /// Append a definition for `face`. Earlier definitions stay in place.
    pub fn insert_activity(
        &self,
        face: FaceId,
        label: &str,
        date_added: i64,
    ) -> Result<ActivityDefinition, StoreError> {
        self.conn.execute(
            "INSERT INTO activities (date_added, face_id, activity_string) VALUES (?1, ?2, ?3)",
            params![date_added, face.as_i64(), label],
        )?;
        let id = self.conn.last_insert_rowid();

        Ok(ActivityDefinition {
            id,
            date_added: to_datetime(date_added, "date_added")?,
            face,
            label: label.to_string(),
        })
    }

    /// Every stored definition, oldest id first.
    pub fn activities(&self) -> Result<Vec<ActivityDefinition>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, date_added, face_id, activity_string FROM activities ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], read_activity_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .filter_map(|row| row.into_definition().transpose())
            .collect()
    }
}
