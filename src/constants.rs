//! Table and batch names shared by the schema, the loaders and the orchestrator.

// Raw staging tables (every column is a wide string)
pub const STAGING_EVENTS_TABLE: &str = "staging_events";
pub const STAGING_SONGS_TABLE: &str = "staging_songs";

// Intermediate staging tables
pub const ARTIST_CANDIDATES_TABLE: &str = "staging_artist_candidates";
pub const ARTIST_IDENTITIES_TABLE: &str = "staging_artist_identities";

// Star schema
pub const SONGPLAYS_TABLE: &str = "songplays";
pub const USERS_TABLE: &str = "users";
pub const SONGS_TABLE: &str = "songs";
pub const ARTISTS_TABLE: &str = "artists";
pub const TIME_TABLE: &str = "time";

// Batch labels used in logs, metrics and statement errors
pub const RAW_STAGING_BATCH: &str = "raw_staging";
pub const INTERMEDIATE_STAGING_BATCH: &str = "intermediate_staging";
pub const DWH_BATCH: &str = "dwh";

/// Only song plays are facts; every other page event is navigation noise.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// COPY JSON option for song files, matched to columns by name.
pub const SONG_DATA_FORMAT: &str = "auto ignorecase";

/// Step whose rows are the canonical artist identities.
pub const FINAL_RESOLUTION_STEP: u8 = 6;
