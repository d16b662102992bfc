//! Star-schema builders: artists, songs, users, time and the songplay fact.
//!
//! Each builder is a pure function of the staging rows. [`DimensionalModel`]
//! gathers their output and renders it as the single DWH batch.

pub mod artist;
pub mod song;
pub mod songplay;
pub mod time;
pub mod user;

pub use artist::{build_artists, read_canonical_identities, ArtistRow};
pub use song::{build_songs, SongRow};
pub use songplay::{build_songplays, SongplayRow};
pub use self::time::{decompose_time_key, time_key, TimeRow};
pub use user::{build_users, UserRow};

use crate::constants::DWH_BATCH;
use crate::resolution::ResolvedArtistIdentity;
use crate::schema::{truncate_statements, DWH_TABLES};
use crate::staging::{RawEvent, RawSongObservation};
use crate::warehouse::{insert_statements, Batch, TableRow};
use serde::Serialize;
use std::collections::BTreeMap;
use self::time::parse_epoch_ms;
use tracing::info;
use user::is_song_play;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DimensionalModel {
    pub artists: Vec<ArtistRow>,
    pub songs: Vec<SongRow>,
    pub users: Vec<UserRow>,
    pub time: Vec<TimeRow>,
    pub songplays: Vec<SongplayRow>,
    pub skipped_plays: usize,
}

/// One time row per hour bucket touched by a song play.
pub fn build_time(events: &[RawEvent]) -> Vec<TimeRow> {
    let mut buckets: BTreeMap<i64, TimeRow> = BTreeMap::new();
    for event in events.iter().filter(|e| is_song_play(e)) {
        if let Some(row) = parse_epoch_ms(event.ts.as_deref()).and_then(TimeRow::from_epoch_ms) {
            buckets.entry(row.time_key).or_insert(row);
        }
    }
    buckets.into_values().collect()
}

pub fn build_dimensional_model(
    identities: &[ResolvedArtistIdentity],
    songs: &[RawSongObservation],
    events: &[RawEvent],
) -> DimensionalModel {
    let songplays = build_songplays(events);
    let model = DimensionalModel {
        artists: build_artists(identities),
        songs: build_songs(songs),
        users: build_users(events),
        time: build_time(events),
        songplays: songplays.rows,
        skipped_plays: songplays.skipped,
    };
    info!(
        "Built star schema: {} artists, {} songs, {} users, {} hours, {} songplays",
        model.artists.len(),
        model.songs.len(),
        model.users.len(),
        model.time.len(),
        model.songplays.len()
    );
    model
}

impl DimensionalModel {
    /// Row counts keyed by table name.
    pub fn row_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            (ArtistRow::table().name, self.artists.len()),
            (SongRow::table().name, self.songs.len()),
            (UserRow::table().name, self.users.len()),
            (TimeRow::table().name, self.time.len()),
            (SongplayRow::table().name, self.songplays.len()),
        ])
    }

    /// Empty every DWH table and refill it, as one transaction.
    pub fn to_batch(&self) -> Batch {
        let mut batch = Batch::new(DWH_BATCH);
        batch.extend(truncate_statements(&DWH_TABLES));
        batch.extend(insert_statements(&self.artists));
        batch.extend(insert_statements(&self.songs));
        batch.extend(insert_statements(&self.users));
        batch.extend(insert_statements(&self.time));
        batch.extend(insert_statements(&self.songplays));
        batch
    }
}
