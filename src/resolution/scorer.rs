use crate::staging::RawSongObservation;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Strict decimal pattern a coordinate must match to earn a score point.
static NUMERIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?([0-9]+(\.[0-9]+)?|\.[0-9]+)$").expect("numeric pattern compiles"));

pub fn matches_numeric_pattern(raw: Option<&str>) -> bool {
    raw.map_or(false, |s| NUMERIC_PATTERN.is_match(s))
}

/// Lenient decimal cast, independent of [`matches_numeric_pattern`]:
/// `" 10.5"` and `"1e3"` cast but do not score.
pub fn cast_decimal(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub fn is_present(raw: Option<&str>) -> bool {
    raw.map_or(false, |s| !s.trim().is_empty())
}

/// One distinct artist observation with its tie-break scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredObservation {
    pub artist_id: String,
    pub artist_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub latitude_text: Option<String>,
    pub longitude_text: Option<String>,
    /// 0..=2, one point per coordinate matching the numeric pattern
    pub coordinate_score: u8,
    /// 1 when location is non-blank
    pub location_score: u8,
}

impl ScoredObservation {
    fn from_parts(
        artist_id: String,
        artist_name: String,
        latitude: Option<String>,
        longitude: Option<String>,
        location: Option<String>,
    ) -> Self {
        let coordinate_score = u8::from(matches_numeric_pattern(latitude.as_deref()))
            + u8::from(matches_numeric_pattern(longitude.as_deref()));
        Self {
            latitude: cast_decimal(latitude.as_deref()),
            longitude: cast_decimal(longitude.as_deref()),
            location_score: u8::from(is_present(location.as_deref())),
            coordinate_score,
            artist_id,
            artist_name,
            location,
            latitude_text: latitude,
            longitude_text: longitude,
        }
    }
}

type ObservationKey = (String, String, Option<String>, Option<String>, Option<String>);

/// Score every distinct (id, name, latitude, longitude, location) observation.
///
/// Observations missing an artist id or name cannot become an identity and
/// are dropped. Output is sorted by the observation key.
pub fn score_observations(raw: &[RawSongObservation]) -> Vec<ScoredObservation> {
    let mut distinct: BTreeSet<ObservationKey> = BTreeSet::new();
    let mut skipped = 0usize;

    for obs in raw {
        match (&obs.artist_id, &obs.artist_name) {
            (Some(id), Some(name)) => {
                distinct.insert((
                    id.clone(),
                    name.clone(),
                    obs.latitude.clone(),
                    obs.longitude.clone(),
                    obs.location.clone(),
                ));
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Dropped {} song observations without artist id or name", skipped);
    }

    distinct
        .into_iter()
        .map(|(id, name, lat, lon, loc)| ScoredObservation::from_parts(id, name, lat, lon, loc))
        .collect()
}
