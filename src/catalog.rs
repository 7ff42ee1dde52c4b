//! Activity catalog: which activity each face stands for.
//!
//! Definitions are append-only. For each face the definition with the latest
//! `date_added` is effective; on equal timestamps the highest id wins.

use std::collections::BTreeMap;

use crate::config::ActivitySeed;
use crate::device::FaceId;
use crate::store::{ActivityDefinition, Store, StoreError};

/// Face -> effective definition, built once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveActivitySet {
    by_face: BTreeMap<FaceId, ActivityDefinition>,
}

impl EffectiveActivitySet {
    /// Resolve latest-definition-wins over `definitions`.
    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = ActivityDefinition>,
    {
        let mut by_face: BTreeMap<FaceId, ActivityDefinition> = BTreeMap::new();

        for definition in definitions {
            let newer = by_face.get(&definition.face).map_or(true, |current| {
                (definition.date_added, definition.id) > (current.date_added, current.id)
            });
            if newer {
                by_face.insert(definition.face, definition);
            }
        }

        Self { by_face }
    }

    /// Read every stored definition and resolve the effective set.
    pub fn load(store: &Store) -> Result<Self, StoreError> {
        let set = Self::from_definitions(store.activities()?);
        tracing::debug!(faces = set.len(), "Loaded activity catalog");
        Ok(set)
    }

    /// The activity assigned to `face`. The sentinel never resolves.
    pub fn get(&self, face: FaceId) -> Option<&ActivityDefinition> {
        if face.is_sentinel() {
            return None;
        }
        self.by_face.get(&face)
    }

    /// Label for `face`, or "nothing" when unassigned.
    pub fn describe(&self, face: FaceId) -> &str {
        self.get(face).map(|a| a.label.as_str()).unwrap_or("nothing")
    }

    pub fn len(&self) -> usize {
        self.by_face.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_face.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityDefinition> {
        self.by_face.values()
    }
}

/// Append a definition for every seed whose label differs from the face's
/// effective label. Returns the definitions that were added.
pub fn import_seeds(
    store: &Store,
    seeds: &[ActivitySeed],
    date_added: i64,
) -> Result<Vec<ActivityDefinition>, StoreError> {
    let mut current = EffectiveActivitySet::load(store)?;
    let mut added = Vec::new();

    for seed in seeds {
        let face = FaceId(seed.face);
        if face.is_sentinel() {
            tracing::warn!(face = seed.face, "Skipping activity for a negative face");
            continue;
        }
        if current.get(face).map(|a| a.label.as_str()) == Some(seed.label.as_str()) {
            continue;
        }
        let definition = store.insert_activity(face, &seed.label, date_added)?;
        current.by_face.insert(face, definition.clone());
        added.push(definition);
    }

    Ok(added)
}
