use super::time::{parse_epoch_ms, start_time, time_key, TIMESTAMP_FORMAT};
use super::user::{is_song_play, parse_user_id};
use crate::resolution::scorer::cast_decimal;
use crate::schema::{TableSpec, SONGPLAYS};
use crate::staging::RawEvent;
use crate::warehouse::{TableRow, Value};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongplayRow {
    /// 0-based, assigned in play order
    pub songplay_id: i64,
    pub start_time_key: i64,
    pub start_time: NaiveDateTime,
    pub user_id: i64,
    pub level: Option<String>,
    pub song_title: Option<String>,
    pub artist_name: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub stream_duration: Option<f64>,
}

impl TableRow for SongplayRow {
    fn table() -> &'static TableSpec {
        &SONGPLAYS
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.songplay_id.into(),
            self.start_time_key.into(),
            self.start_time.format(TIMESTAMP_FORMAT).to_string().into(),
            self.user_id.into(),
            self.level.clone().into(),
            self.song_title.clone().into(),
            self.artist_name.clone().into(),
            self.session_id.into(),
            self.location.clone().into(),
            self.user_agent.clone().into(),
            self.stream_duration.into(),
        ]
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SongplayBuild {
    pub rows: Vec<SongplayRow>,
    /// Song plays dropped for an unusable timestamp or user id
    pub skipped: usize,
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// One fact row per song play, numbered by (ts, session, user, item).
pub fn build_songplays(events: &[RawEvent]) -> SongplayBuild {
    let mut skipped = 0usize;
    let mut plays: Vec<(i64, Option<i64>, i64, Option<i64>, &RawEvent, NaiveDateTime)> = Vec::new();

    for event in events.iter().filter(|e| is_song_play(e)) {
        let ts = parse_epoch_ms(event.ts.as_deref());
        let user_id = parse_user_id(event.user_id.as_deref());
        match (ts, ts.and_then(start_time), user_id) {
            (Some(ts), Some(at), Some(user_id)) => plays.push((
                ts,
                parse_int(event.session_id.as_deref()),
                user_id,
                parse_int(event.item_in_session.as_deref()),
                event,
                at,
            )),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} song plays with an unusable timestamp or user id", skipped);
    }

    plays.sort_by_key(|p| (p.0, p.1, p.2, p.3));

    let rows = plays
        .into_iter()
        .enumerate()
        .map(|(idx, (_, session_id, user_id, _, event, at))| SongplayRow {
            songplay_id: idx as i64,
            start_time_key: time_key(&at),
            start_time: at,
            user_id,
            level: event.level.clone(),
            song_title: event.song.clone(),
            artist_name: event.artist.clone(),
            session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
            stream_duration: cast_decimal(event.length.as_deref()),
        })
        .collect();

    SongplayBuild { rows, skipped }
}
