//! Typed views over the raw staging tables.
//!
//! Raw columns are wide strings; nothing here parses numbers. Parsing and
//! validation belong to the stage that consumes the field.

use crate::constants::{STAGING_EVENTS_TABLE, STAGING_SONGS_TABLE};
use crate::error::Result;
use crate::warehouse::TransactionalExecutor;
use serde::{Deserialize, Serialize};

/// One song file as it landed in `staging_songs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSongObservation {
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub duration: Option<String>,
    pub year: Option<String>,
}

/// One listening-log record as it landed in `staging_events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub artist: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub item_in_session: Option<String>,
    pub length: Option<String>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub page: Option<String>,
    pub session_id: Option<String>,
    pub song: Option<String>,
    pub ts: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
}

pub async fn read_song_observations(executor: &dyn TransactionalExecutor) -> Result<Vec<RawSongObservation>> {
    let sql = format!(
        "SELECT artist_id, artist_name, artist_latitude, artist_longitude, artist_location, title, duration, year FROM {}",
        STAGING_SONGS_TABLE
    );
    let rows = executor.query(&sql).await?;
    Ok(rows
        .iter()
        .map(|r| RawSongObservation {
            artist_id: r.text(0),
            artist_name: r.text(1),
            latitude: r.text(2),
            longitude: r.text(3),
            location: r.text(4),
            title: r.text(5),
            duration: r.text(6),
            year: r.text(7),
        })
        .collect())
}

pub async fn read_events(executor: &dyn TransactionalExecutor) -> Result<Vec<RawEvent>> {
    let sql = format!(
        "SELECT artist, firstName, lastName, gender, itemInSession, length, level, location, page, sessionId, song, ts, userAgent, userId FROM {}",
        STAGING_EVENTS_TABLE
    );
    let rows = executor.query(&sql).await?;
    Ok(rows
        .iter()
        .map(|r| RawEvent {
            artist: r.text(0),
            first_name: r.text(1),
            last_name: r.text(2),
            gender: r.text(3),
            item_in_session: r.text(4),
            length: r.text(5),
            level: r.text(6),
            location: r.text(7),
            page: r.text(8),
            session_id: r.text(9),
            song: r.text(10),
            ts: r.text(11),
            user_agent: r.text(12),
            user_id: r.text(13),
        })
        .collect())
}
