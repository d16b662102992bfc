use super::scorer::ScoredObservation;
use crate::error::{Result, WarehouseError};
use crate::schema::{TableSpec, ARTIST_CANDIDATES};
use crate::warehouse::{TableRow, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AmbiguityFlags {
    /// The artist id appears with more than one distinct name
    pub multiple_name_indicator: bool,
    /// The artist name appears with more than one distinct id
    pub multiple_id_indicator: bool,
}

/// The four disjoint partitions of (multiple_name, multiple_id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AmbiguityClass {
    /// (0,0)
    Unambiguous,
    /// (0,1): the name is shared by several ids
    SharedName,
    /// (1,0): the id is shared by several names
    SharedId,
    /// (1,1)
    Both,
}

impl AmbiguityClass {
    /// Resolution order: each class is reconciled by its own pass.
    pub const ALL: [AmbiguityClass; 4] = [
        AmbiguityClass::Unambiguous,
        AmbiguityClass::SharedName,
        AmbiguityClass::SharedId,
        AmbiguityClass::Both,
    ];

    /// The resolver step that handles this class.
    ///
    /// Steps follow the flag tuple order (0,0) (0,1) (1,0) (1,1), so a name
    /// shared by several ids is step 2 and an id shared by several names is
    /// step 3. The two classes never see each other's names, so swapping them
    /// would change only the `step` column, not the canonical rows.
    pub fn step(self) -> u8 {
        match self {
            AmbiguityClass::Unambiguous => 1,
            AmbiguityClass::SharedName => 2,
            AmbiguityClass::SharedId => 3,
            AmbiguityClass::Both => 4,
        }
    }

    /// Membership test for one class, evaluated independently per class.
    pub fn admits(self, flags: AmbiguityFlags) -> bool {
        let expected = match self {
            AmbiguityClass::Unambiguous => (false, false),
            AmbiguityClass::SharedName => (false, true),
            AmbiguityClass::SharedId => (true, false),
            AmbiguityClass::Both => (true, true),
        };
        (flags.multiple_name_indicator, flags.multiple_id_indicator) == expected
    }
}

/// A scored observation annotated with its pair's ambiguity flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistCandidate {
    pub observation: ScoredObservation,
    pub flags: AmbiguityFlags,
    pub class: AmbiguityClass,
}

impl TableRow for ArtistCandidate {
    fn table() -> &'static TableSpec {
        &ARTIST_CANDIDATES
    }

    fn values(&self) -> Vec<Value> {
        let o = &self.observation;
        vec![
            o.artist_id.clone().into(),
            o.artist_name.clone().into(),
            o.latitude.into(),
            o.longitude.into(),
            o.location.clone().into(),
            i64::from(o.coordinate_score).into(),
            i64::from(o.location_score).into(),
            self.flags.multiple_name_indicator.into(),
            self.flags.multiple_id_indicator.into(),
        ]
    }
}

/// Flag id↔name ambiguity over the distinct (id, name) pairs and place each
/// observation in exactly one class.
pub fn classify(observations: Vec<ScoredObservation>) -> Result<Vec<ArtistCandidate>> {
    let pairs: BTreeSet<(&str, &str)> = observations
        .iter()
        .map(|o| (o.artist_id.as_str(), o.artist_name.as_str()))
        .collect();

    let mut names_per_id: BTreeMap<&str, usize> = BTreeMap::new();
    let mut ids_per_name: BTreeMap<&str, usize> = BTreeMap::new();
    for &(id, name) in &pairs {
        *names_per_id.entry(id).or_default() += 1;
        *ids_per_name.entry(name).or_default() += 1;
    }

    let flags_for = |id: &str, name: &str| AmbiguityFlags {
        multiple_name_indicator: names_per_id.get(id).copied().unwrap_or(0) > 1,
        multiple_id_indicator: ids_per_name.get(name).copied().unwrap_or(0) > 1,
    };

    let mut counts: BTreeMap<AmbiguityClass, usize> = BTreeMap::new();
    let mut candidates = Vec::with_capacity(observations.len());
    for observation in &observations {
        let flags = flags_for(&observation.artist_id, &observation.artist_name);
        let matched: Vec<AmbiguityClass> = AmbiguityClass::ALL
            .iter()
            .copied()
            .filter(|class| class.admits(flags))
            .collect();
        let class = match matched.as_slice() {
            [class] => *class,
            _ => {
                return Err(WarehouseError::InvariantViolation(format!(
                    "artist ({}, {}) falls in {} ambiguity classes",
                    observation.artist_id,
                    observation.artist_name,
                    matched.len()
                )))
            }
        };
        *counts.entry(class).or_default() += 1;
        candidates.push(ArtistCandidate {
            observation: observation.clone(),
            flags,
            class,
        });
    }

    info!(
        "Classified {} artist observations over {} id/name pairs: {:?}",
        candidates.len(),
        pairs.len(),
        counts
    );
    Ok(candidates)
}
