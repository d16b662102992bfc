//! Six-pass artist identity reconciliation.
//!
//! Passes 1-4 resolve each ambiguity class on its own, appending to a shared
//! ledger. Pass 5 forces every row of a name onto one id. Pass 6 collapses
//! the ledger to one canonical row per (name, id) with the best coordinates
//! and location seen for that id.

use super::classifier::{AmbiguityClass, ArtistCandidate};
use super::scorer::{is_present, ScoredObservation};
use crate::constants::FINAL_RESOLUTION_STEP;
use crate::error::{Result, WarehouseError};
use crate::metrics;
use crate::schema::{TableSpec, ARTIST_IDENTITIES};
use crate::warehouse::{TableRow, Value};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Emit a null longitude from passes 2 and 3, as the legacy warehouse
    /// queries did when they projected the longitude under another alias.
    pub drop_ambiguous_longitude: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedArtistIdentity {
    pub original_artist_id: String,
    pub artist_name: String,
    pub recalculated_artist_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    /// Pass that produced the row, 1..=6
    pub step: u8,
}

impl TableRow for ResolvedArtistIdentity {
    fn table() -> &'static TableSpec {
        &ARTIST_IDENTITIES
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.original_artist_id.clone().into(),
            self.artist_name.clone().into(),
            self.recalculated_artist_id.clone().into(),
            self.latitude.into(),
            self.longitude.into(),
            self.location.clone().into(),
            i64::from(self.step).into(),
        ]
    }
}

/// Best observation by `score`, ties broken by the raw text of the value.
fn best_by<'a, K: Ord>(
    observations: &[&'a ScoredObservation],
    score: impl Fn(&ScoredObservation) -> u8,
    text: impl Fn(&'a ScoredObservation) -> K,
) -> Option<&'a ScoredObservation> {
    observations
        .iter()
        .copied()
        .min_by_key(|&o| (Reverse(score(o)), text(o)))
}

/// Highest recalculated id recorded per name so far.
fn canonical_ids_by_name(rows: &[ResolvedArtistIdentity]) -> BTreeMap<&str, &str> {
    let mut by_name: BTreeMap<&str, &str> = BTreeMap::new();
    for row in rows {
        by_name
            .entry(row.artist_name.as_str())
            .and_modify(|id| {
                if row.recalculated_artist_id.as_str() > *id {
                    *id = row.recalculated_artist_id.as_str();
                }
            })
            .or_insert(row.recalculated_artist_id.as_str());
    }
    by_name
}

/// Append-only working table shared by all passes.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    rows: Vec<ResolvedArtistIdentity>,
}

impl IdentityLedger {
    pub fn rows(&self) -> &[ResolvedArtistIdentity] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ResolvedArtistIdentity> {
        self.rows
    }

    fn step_rows(&self, step: u8) -> impl Iterator<Item = &ResolvedArtistIdentity> {
        self.rows.iter().filter(move |r| r.step == step)
    }

    fn append(&mut self, step: u8, rows: Vec<ResolvedArtistIdentity>) {
        metrics::resolver_rows(step, rows.len());
        debug!("Pass {} appended {} rows", step, rows.len());
        self.rows.extend(rows);
    }
}

pub struct IdentityResolver {
    options: ResolverOptions,
}

impl IdentityResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Run all six passes and return every row they appended.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn resolve(&self, candidates: &[ArtistCandidate]) -> Result<IdentityLedger> {
        let mut ledger = IdentityLedger::default();

        for class in AmbiguityClass::ALL {
            let rows = self.resolve_class(class, candidates, &ledger);
            ledger.append(class.step(), rows);
        }

        let converged = Self::converge(&ledger);
        ledger.append(5, converged);

        let canonical = Self::canonicalize(&ledger)?;
        ledger.append(FINAL_RESOLUTION_STEP, canonical);

        info!(
            "Resolved {} artist names from {} candidates",
            ledger.step_rows(FINAL_RESOLUTION_STEP).count(),
            candidates.len()
        );
        Ok(ledger)
    }

    /// Passes 1-4: one row per (id, name) pair of `class`.
    fn resolve_class(
        &self,
        class: AmbiguityClass,
        candidates: &[ArtistCandidate],
        ledger: &IdentityLedger,
    ) -> Vec<ResolvedArtistIdentity> {
        let step = class.step();
        // Only rows from earlier passes are visible to this one
        let earlier = canonical_ids_by_name(ledger.rows());

        let mut by_pair: BTreeMap<(&str, &str), Vec<&ScoredObservation>> = BTreeMap::new();
        for candidate in candidates.iter().filter(|c| c.class == class) {
            let o = &candidate.observation;
            by_pair
                .entry((o.artist_id.as_str(), o.artist_name.as_str()))
                .or_default()
                .push(o);
        }

        let blank_longitude = self.options.drop_ambiguous_longitude
            && matches!(class, AmbiguityClass::SharedName | AmbiguityClass::SharedId);

        by_pair
            .into_iter()
            .map(|((id, name), observations)| {
                let recalculated = match class {
                    AmbiguityClass::Unambiguous => id,
                    _ => earlier.get(name).copied().unwrap_or(id),
                };
                let coords = best_by(&observations, |o| o.coordinate_score, |o| {
                    (o.latitude_text.as_deref(), o.longitude_text.as_deref())
                });
                let place = best_by(&observations, |o| o.location_score, |o| o.location.as_deref());

                ResolvedArtistIdentity {
                    original_artist_id: id.to_string(),
                    artist_name: name.to_string(),
                    recalculated_artist_id: recalculated.to_string(),
                    latitude: coords.and_then(|o| o.latitude),
                    longitude: if blank_longitude {
                        None
                    } else {
                        coords.and_then(|o| o.longitude)
                    },
                    location: place.and_then(|o| o.location.clone()),
                    step,
                }
            })
            .collect()
    }

    /// Pass 5: every row of a name takes the name's greatest id from passes 1-4.
    fn converge(ledger: &IdentityLedger) -> Vec<ResolvedArtistIdentity> {
        let local: Vec<ResolvedArtistIdentity> = ledger
            .rows()
            .iter()
            .filter(|r| (1..=4).contains(&r.step))
            .cloned()
            .collect();
        let by_name = canonical_ids_by_name(&local);

        local
            .iter()
            .map(|row| {
                let canonical = by_name
                    .get(row.artist_name.as_str())
                    .copied()
                    .unwrap_or(row.recalculated_artist_id.as_str());
                if canonical != row.recalculated_artist_id {
                    debug!(
                        "Name '{}' moved from {} to {}",
                        row.artist_name, row.recalculated_artist_id, canonical
                    );
                }
                ResolvedArtistIdentity {
                    recalculated_artist_id: canonical.to_string(),
                    step: 5,
                    ..row.clone()
                }
            })
            .collect()
    }

    /// Pass 6: best values per recalculated id, one row per (name, id).
    fn canonicalize(ledger: &IdentityLedger) -> Result<Vec<ResolvedArtistIdentity>> {
        let converged: Vec<&ResolvedArtistIdentity> = ledger.step_rows(5).collect();

        let mut by_id: BTreeMap<&str, Vec<&ResolvedArtistIdentity>> = BTreeMap::new();
        for &row in &converged {
            by_id.entry(row.recalculated_artist_id.as_str()).or_default().push(row);
        }

        let coordinate_score =
            |r: &ResolvedArtistIdentity| u8::from(r.latitude.is_some()) + u8::from(r.longitude.is_some());
        let location_score = |r: &ResolvedArtistIdentity| u8::from(is_present(r.location.as_deref()));

        let mut best: BTreeMap<&str, (&ResolvedArtistIdentity, &ResolvedArtistIdentity)> = BTreeMap::new();
        for (id, rows) in &by_id {
            let pick = |score: &dyn Fn(&ResolvedArtistIdentity) -> u8| {
                rows.iter().copied().min_by(|a, b| rank_for_canonical(a, b, score))
            };
            if let (Some(coords), Some(place)) = (pick(&coordinate_score), pick(&location_score)) {
                best.insert(*id, (coords, place));
            }
        }

        let pairs: BTreeSet<(&str, &str)> = converged
            .iter()
            .map(|r| (r.artist_name.as_str(), r.recalculated_artist_id.as_str()))
            .collect();

        let mut seen_names: BTreeSet<&str> = BTreeSet::new();
        let mut rows = Vec::with_capacity(pairs.len());
        for (name, id) in pairs {
            if !seen_names.insert(name) {
                return Err(WarehouseError::InvariantViolation(format!(
                    "artist name '{}' resolved to more than one id after convergence",
                    name
                )));
            }
            let (coords, place) = best.get(id).copied().ok_or_else(|| {
                WarehouseError::InvariantViolation(format!("no converged rows for artist id '{}'", id))
            })?;
            if coords.latitude.is_none() && coords.longitude.is_none() {
                debug!("No coordinates observed for '{}'", name);
            }
            rows.push(ResolvedArtistIdentity {
                original_artist_id: id.to_string(),
                artist_name: name.to_string(),
                recalculated_artist_id: id.to_string(),
                latitude: coords.latitude,
                longitude: coords.longitude,
                location: place.location.clone(),
                step: FINAL_RESOLUTION_STEP,
            });
        }

        if rows.is_empty() && !converged.is_empty() {
            warn!("Pass 6 produced no canonical rows from {} converged rows", converged.len());
        }
        Ok(rows)
    }
}

/// Strict total order for pass-6 selection: higher score first, then the
/// canonical id's own observation, then original id and name.
fn rank_for_canonical(
    a: &ResolvedArtistIdentity,
    b: &ResolvedArtistIdentity,
    score: &dyn Fn(&ResolvedArtistIdentity) -> u8,
) -> Ordering {
    let own = |r: &ResolvedArtistIdentity| r.original_artist_id != r.recalculated_artist_id;
    score(b)
        .cmp(&score(a))
        .then_with(|| own(a).cmp(&own(b)))
        .then_with(|| a.original_artist_id.cmp(&b.original_artist_id))
        .then_with(|| a.artist_name.cmp(&b.artist_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::classifier::classify;
    use crate::resolution::scorer::score_observations;
    use crate::staging::RawSongObservation;

    fn obs(id: &str, name: &str, lat: Option<&str>, lon: Option<&str>, loc: Option<&str>) -> RawSongObservation {
        RawSongObservation {
            artist_id: Some(id.to_string()),
            artist_name: Some(name.to_string()),
            latitude: lat.map(String::from),
            longitude: lon.map(String::from),
            location: loc.map(String::from),
            ..Default::default()
        }
    }

    fn resolve_with(raw: &[RawSongObservation], options: ResolverOptions) -> Vec<ResolvedArtistIdentity> {
        let candidates = classify(score_observations(raw)).unwrap();
        IdentityResolver::new(options).resolve(&candidates).unwrap().into_rows()
    }

    fn resolve(raw: &[RawSongObservation]) -> Vec<ResolvedArtistIdentity> {
        resolve_with(raw, ResolverOptions::default())
    }

    fn final_rows(rows: &[ResolvedArtistIdentity]) -> Vec<&ResolvedArtistIdentity> {
        rows.iter().filter(|r| r.step == FINAL_RESOLUTION_STEP).collect()
    }

    #[test]
    fn test_shared_name_resolves_to_greatest_id() {
        let rows = resolve(&[
            obs("A", "X", Some("10.5"), None, None),
            obs("B", "X", Some("11.0"), Some("-2.0"), None),
        ]);

        let pass2: Vec<_> = rows.iter().filter(|r| r.step == 2).collect();
        assert_eq!(pass2.len(), 2);
        // nothing earlier knew "X", so each keeps its own id
        assert!(pass2.iter().all(|r| r.recalculated_artist_id == r.original_artist_id));

        let pass5: Vec<_> = rows.iter().filter(|r| r.step == 5).collect();
        assert!(pass5.iter().all(|r| r.recalculated_artist_id == "B"));

        let finals = final_rows(&rows);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].artist_name, "X");
        assert_eq!(finals[0].recalculated_artist_id, "B");
        assert_eq!(finals[0].latitude, Some(11.0));
        assert_eq!(finals[0].longitude, Some(-2.0));
    }

    #[test]
    fn test_equal_scores_prefer_canonical_ids_own_coordinates() {
        let rows = resolve(&[
            obs("A", "X", Some("10.5"), None, None),
            obs("B", "X", Some("11.0"), None, None),
        ]);
        let finals = final_rows(&rows);
        assert_eq!(finals[0].recalculated_artist_id, "B");
        assert_eq!(finals[0].latitude, Some(11.0));
    }

    #[test]
    fn test_higher_score_wins_within_a_pair() {
        let rows = resolve(&[
            obs("A", "X", Some("1"), None, None),
            obs("A", "X", Some("2"), Some("3"), Some("Paris")),
            obs("A", "X", None, None, Some("")),
        ]);
        let pass1: Vec<_> = rows.iter().filter(|r| r.step == 1).collect();
        assert_eq!(pass1.len(), 1);
        assert_eq!(pass1[0].latitude, Some(2.0));
        assert_eq!(pass1[0].longitude, Some(3.0));
        assert_eq!(pass1[0].location.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_selection_ignores_input_order() {
        let a = obs("A", "X", Some("1"), None, Some("Leeds"));
        let b = obs("A", "X", Some("2"), None, Some("York"));
        let forward = resolve(&[a.clone(), b.clone()]);
        let backward = resolve(&[b, a]);
        assert_eq!(forward, backward);
        // equal scores: smaller raw text wins
        let finals = final_rows(&forward);
        assert_eq!(finals[0].latitude, Some(1.0));
        assert_eq!(finals[0].location.as_deref(), Some("Leeds"));
    }

    #[test]
    fn test_both_ambiguous_sees_earlier_passes() {
        // "Qx" has ids Q and R; id Q also has name "Q"
        let rows = resolve(&[
            obs("Q", "Q", None, None, None),
            obs("Q", "Qx", None, None, None),
            obs("R", "Qx", Some("5"), Some("6"), None),
        ]);

        let pass2 = rows.iter().find(|r| r.step == 2).unwrap();
        assert_eq!((pass2.original_artist_id.as_str(), pass2.artist_name.as_str()), ("R", "Qx"));

        let pass4 = rows.iter().find(|r| r.step == 4).unwrap();
        assert_eq!(pass4.original_artist_id, "Q");
        assert_eq!(pass4.recalculated_artist_id, "R");

        let finals = final_rows(&rows);
        let qx = finals.iter().find(|r| r.artist_name == "Qx").unwrap();
        let q = finals.iter().find(|r| r.artist_name == "Q").unwrap();
        assert_eq!(qx.recalculated_artist_id, "R");
        assert_eq!(q.recalculated_artist_id, "Q");
    }

    #[test]
    fn test_every_name_converges_to_one_id() {
        let rows = resolve(&[
            obs("A1", "Alpha", None, None, None),
            obs("A2", "Alpha", None, None, None),
            obs("A2", "Alpha & Co", None, None, None),
            obs("A3", "Alpha & Co", None, None, None),
            obs("B1", "Beta", None, None, None),
        ]);
        let finals = final_rows(&rows);
        let names: BTreeSet<&str> = finals.iter().map(|r| r.artist_name.as_str()).collect();
        assert_eq!(names.len(), finals.len());

        let converged: Vec<ResolvedArtistIdentity> = rows.iter().filter(|r| r.step == 5).cloned().collect();
        let by_name = canonical_ids_by_name(&converged);
        for row in &converged {
            assert_eq!(by_name[row.artist_name.as_str()], row.recalculated_artist_id);
        }
        // A2/"Alpha" is resolved in pass 4 onto the id pass 2 chose
        assert_eq!(by_name["Alpha"], "A1");
        assert_eq!(by_name["Alpha & Co"], "A3");
    }

    #[test]
    fn test_canonical_values_shared_across_names_of_one_id() {
        let rows = resolve(&[
            obs("M", "Mono", Some("1"), Some("2"), Some("Oslo")),
            obs("M", "Mono (live)", None, None, None),
        ]);
        let finals = final_rows(&rows);
        assert_eq!(finals.len(), 2);
        assert!(finals.iter().all(|r| r.latitude == Some(1.0) && r.location.as_deref() == Some("Oslo")));
    }

    #[test]
    fn test_no_coordinates_leaves_nulls() {
        let rows = resolve(&[obs("Z", "Zed", Some("n/a"), Some(""), None)]);
        let finals = final_rows(&rows);
        assert_eq!(finals[0].latitude, None);
        assert_eq!(finals[0].longitude, None);
        assert_eq!(finals[0].location, None);
    }

    #[test]
    fn test_legacy_longitude_gap_is_opt_in() {
        let raw = [
            obs("A", "X", Some("1"), Some("2"), None),
            obs("B", "X", Some("1"), Some("2"), None),
        ];
        let default_rows = resolve(&raw);
        assert!(default_rows.iter().filter(|r| r.step == 2).all(|r| r.longitude == Some(2.0)));

        let legacy = resolve_with(&raw, ResolverOptions { drop_ambiguous_longitude: true });
        assert!(legacy.iter().filter(|r| r.step == 2).all(|r| r.longitude.is_none()));
        assert_eq!(final_rows(&legacy)[0].longitude, None);
        assert_eq!(final_rows(&legacy)[0].latitude, Some(1.0));
    }

    #[test]
    fn test_empty_input_resolves_to_nothing() {
        assert!(resolve(&[]).is_empty());
    }
}
