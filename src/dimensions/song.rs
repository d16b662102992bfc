use crate::resolution::scorer::cast_decimal;
use crate::schema::{TableSpec, SONGS};
use crate::staging::RawSongObservation;
use crate::warehouse::{TableRow, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRow {
    pub artist_name: String,
    pub title: String,
    pub year: Option<i64>,
    pub duration: Option<f64>,
}

impl TableRow for SongRow {
    fn table() -> &'static TableSpec {
        &SONGS
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.artist_name.clone().into(),
            self.title.clone().into(),
            self.year.into(),
            self.duration.into(),
        ]
    }
}

fn parse_year(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn max_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// One row per (artist_name, title) carrying the largest year and duration seen.
pub fn build_songs(observations: &[RawSongObservation]) -> Vec<SongRow> {
    let mut songs: BTreeMap<(String, String), SongRow> = BTreeMap::new();
    let mut skipped = 0usize;

    for obs in observations {
        let (Some(artist_name), Some(title)) = (&obs.artist_name, &obs.title) else {
            skipped += 1;
            continue;
        };
        let year = parse_year(obs.year.as_deref());
        let duration = cast_decimal(obs.duration.as_deref());

        songs
            .entry((artist_name.clone(), title.clone()))
            .and_modify(|song| {
                song.year = song.year.max(year);
                song.duration = max_f64(song.duration, duration);
            })
            .or_insert_with(|| SongRow {
                artist_name: artist_name.clone(),
                title: title.clone(),
                year,
                duration,
            });
    }

    if skipped > 0 {
        debug!("Skipped {} song observations without artist name or title", skipped);
    }
    songs.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(artist: &str, title: &str, year: Option<&str>, duration: Option<&str>) -> RawSongObservation {
        RawSongObservation {
            artist_id: Some("AR1".into()),
            artist_name: Some(artist.into()),
            title: Some(title.into()),
            year: year.map(String::from),
            duration: duration.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicates_take_max_year_and_duration() {
        let songs = build_songs(&[
            song("Muse", "Hysteria", Some("2003"), Some("229.1")),
            song("Muse", "Hysteria", Some("0"), Some("231.5")),
            song("Muse", "Hysteria", None, Some("bad")),
        ]);
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].year, Some(2003));
        assert_eq!(songs[0].duration, Some(231.5));
    }

    #[test]
    fn test_same_title_by_different_artists_stays_apart() {
        let songs = build_songs(&[
            song("Muse", "Intro", Some("2001"), None),
            song("Blur", "Intro", None, None),
        ]);
        let keys: Vec<(&str, &str)> = songs.iter().map(|s| (s.artist_name.as_str(), s.title.as_str())).collect();
        assert_eq!(keys, vec![("Blur", "Intro"), ("Muse", "Intro")]);
        assert_eq!(songs[0].year, None);
    }

    #[test]
    fn test_untitled_observations_are_skipped() {
        let mut untitled = song("Muse", "x", None, None);
        untitled.title = None;
        assert!(build_songs(&[untitled]).is_empty());
    }
}
