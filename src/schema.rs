//! Table definitions for every layer of the warehouse and their DDL.
//!
//! The same specs render for the local SQLite engine and for Redshift, where
//! distribution style, distribution key and sort key are part of the table
//! contract.

use crate::constants::*;
use crate::error::{Result, WarehouseError};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Redshift,
}

impl FromStr for Dialect {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "redshift" => Ok(Dialect::Redshift),
            other => Err(WarehouseError::Config(format!("Unknown SQL dialect '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Wide string; `None` means the engine default length
    Varchar(Option<u32>),
    Integer,
    BigInt,
    Decimal,
    Boolean,
    Timestamp,
}

impl SqlType {
    fn render(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (SqlType::Varchar(Some(len)), _) => format!("VARCHAR({})", len),
            (SqlType::Varchar(None), Dialect::Redshift) => "VARCHAR(256)".to_string(),
            (SqlType::Varchar(None), Dialect::Sqlite) => "VARCHAR".to_string(),
            (SqlType::Integer, _) => "INTEGER".to_string(),
            (SqlType::BigInt, _) => "BIGINT".to_string(),
            (SqlType::Decimal, Dialect::Redshift) => "DECIMAL(18,6)".to_string(),
            // NUMERIC affinity would turn 11.0 into 11 on the way in
            (SqlType::Decimal, Dialect::Sqlite) => "REAL".to_string(),
            (SqlType::Boolean, _) => "BOOLEAN".to_string(),
            (SqlType::Timestamp, Dialect::Redshift) => "TIMESTAMP WITHOUT TIME ZONE".to_string(),
            (SqlType::Timestamp, Dialect::Sqlite) => "TIMESTAMP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub not_null: bool,
}

const fn nullable(name: &'static str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        not_null: false,
    }
}

const fn required(name: &'static str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        not_null: true,
    }
}

const WIDE: SqlType = SqlType::Varchar(None);
const LONG_TEXT: SqlType = SqlType::Varchar(Some(1000));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistStyle {
    /// Round-robin; used for staging tables that are only scanned
    Even,
    /// Replicated to every node; small dimensions
    All,
    /// Co-located by the named column
    Key(&'static str),
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static [&'static str],
    pub dist_style: DistStyle,
    pub sort_key: Option<&'static str>,
}

impl TableSpec {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", self.name);
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.not_null { " NOT NULL" } else { "" };
                format!("    {} {}{}", c.name, c.sql_type.render(dialect), null)
            })
            .collect();
        if !self.primary_key.is_empty() {
            lines.push(format!("    PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        sql.push_str(&lines.join(",\n"));
        sql.push_str("\n)");

        if dialect == Dialect::Redshift {
            match self.dist_style {
                DistStyle::Even => sql.push_str(" DISTSTYLE EVEN"),
                DistStyle::All => sql.push_str(" DISTSTYLE ALL"),
                DistStyle::Key(column) => {
                    let _ = write!(sql, " DISTSTYLE KEY DISTKEY ({})", column);
                }
            }
            if let Some(sort_key) = self.sort_key {
                let _ = write!(sql, " SORTKEY ({})", sort_key);
            }
        }
        sql.push(';');
        sql
    }

    /// Positional insert used by the row writers.
    pub fn insert_sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.name,
            self.column_names().join(", "),
            placeholders.join(", ")
        )
    }
}

pub static STAGING_EVENTS: TableSpec = TableSpec {
    name: STAGING_EVENTS_TABLE,
    columns: &[
        nullable("artist", LONG_TEXT),
        nullable("auth", WIDE),
        nullable("firstName", WIDE),
        nullable("gender", WIDE),
        nullable("itemInSession", WIDE),
        nullable("lastName", WIDE),
        nullable("length", WIDE),
        nullable("level", WIDE),
        nullable("location", LONG_TEXT),
        nullable("method", WIDE),
        nullable("page", WIDE),
        nullable("registration", WIDE),
        nullable("sessionId", WIDE),
        nullable("song", LONG_TEXT),
        nullable("status", WIDE),
        nullable("ts", WIDE),
        nullable("userAgent", LONG_TEXT),
        nullable("userId", WIDE),
    ],
    primary_key: &[],
    dist_style: DistStyle::Even,
    sort_key: None,
};

pub static STAGING_SONGS: TableSpec = TableSpec {
    name: STAGING_SONGS_TABLE,
    columns: &[
        nullable("song_id", WIDE),
        nullable("num_songs", WIDE),
        nullable("title", LONG_TEXT),
        nullable("artist_name", LONG_TEXT),
        nullable("artist_latitude", WIDE),
        nullable("year", WIDE),
        nullable("duration", WIDE),
        nullable("artist_id", WIDE),
        nullable("artist_longitude", WIDE),
        nullable("artist_location", LONG_TEXT),
    ],
    primary_key: &[],
    dist_style: DistStyle::Even,
    sort_key: None,
};

pub static ARTIST_CANDIDATES: TableSpec = TableSpec {
    name: ARTIST_CANDIDATES_TABLE,
    columns: &[
        required("artist_id", WIDE),
        required("artist_name", LONG_TEXT),
        nullable("artist_latitude", SqlType::Decimal),
        nullable("artist_longitude", SqlType::Decimal),
        nullable("artist_location", LONG_TEXT),
        required("coordinate_score", SqlType::Integer),
        required("location_score", SqlType::Integer),
        required("multiple_name_indicator", SqlType::Boolean),
        required("multiple_id_indicator", SqlType::Boolean),
    ],
    primary_key: &[],
    dist_style: DistStyle::Key("artist_name"),
    sort_key: Some("artist_name"),
};

pub static ARTIST_IDENTITIES: TableSpec = TableSpec {
    name: ARTIST_IDENTITIES_TABLE,
    columns: &[
        required("original_artist_id", WIDE),
        required("artist_name", LONG_TEXT),
        nullable("recalculated_artist_id", WIDE),
        nullable("artist_latitude", SqlType::Decimal),
        nullable("artist_longitude", SqlType::Decimal),
        nullable("artist_location", LONG_TEXT),
        required("step", SqlType::Integer),
    ],
    primary_key: &[],
    dist_style: DistStyle::Key("artist_name"),
    sort_key: Some("step"),
};

pub static SONGPLAYS: TableSpec = TableSpec {
    name: SONGPLAYS_TABLE,
    columns: &[
        required("songplay_id", SqlType::BigInt),
        required("start_time_key", SqlType::BigInt),
        required("start_time", SqlType::Timestamp),
        required("user_id", SqlType::Integer),
        nullable("level", WIDE),
        nullable("song_title", LONG_TEXT),
        nullable("artist_name", LONG_TEXT),
        nullable("session_id", SqlType::Integer),
        nullable("location", LONG_TEXT),
        nullable("user_agent", LONG_TEXT),
        nullable("stream_duration", SqlType::Decimal),
    ],
    primary_key: &["songplay_id"],
    dist_style: DistStyle::Key("artist_name"),
    sort_key: Some("start_time_key"),
};

pub static USERS: TableSpec = TableSpec {
    name: USERS_TABLE,
    columns: &[
        required("user_id", SqlType::Integer),
        nullable("first_name", WIDE),
        nullable("last_name", WIDE),
        nullable("gender", WIDE),
        nullable("level", WIDE),
    ],
    primary_key: &["user_id"],
    dist_style: DistStyle::All,
    sort_key: Some("user_id"),
};

pub static SONGS: TableSpec = TableSpec {
    name: SONGS_TABLE,
    columns: &[
        required("artist_name", LONG_TEXT),
        required("title", LONG_TEXT),
        nullable("year", SqlType::Integer),
        nullable("duration", SqlType::Decimal),
    ],
    primary_key: &["artist_name", "title"],
    dist_style: DistStyle::Key("artist_name"),
    sort_key: Some("title"),
};

pub static ARTISTS: TableSpec = TableSpec {
    name: ARTISTS_TABLE,
    columns: &[
        required("name", LONG_TEXT),
        required("artist_id", WIDE),
        nullable("latitude", SqlType::Decimal),
        nullable("longitude", SqlType::Decimal),
        nullable("location", LONG_TEXT),
    ],
    primary_key: &["name"],
    dist_style: DistStyle::All,
    sort_key: Some("name"),
};

pub static TIME: TableSpec = TableSpec {
    name: TIME_TABLE,
    columns: &[
        required("time_key", SqlType::BigInt),
        required("timestamp_date", SqlType::Timestamp),
        required("hour", SqlType::Integer),
        required("day", SqlType::Integer),
        required("week", SqlType::Integer),
        required("month", SqlType::Integer),
        required("year", SqlType::Integer),
        required("day_of_week", SqlType::Integer),
        required("day_of_week_name", WIDE),
        required("is_weekend", SqlType::Boolean),
    ],
    primary_key: &["time_key"],
    dist_style: DistStyle::All,
    sort_key: Some("time_key"),
};

pub static RAW_STAGING_TABLES: [&TableSpec; 2] = [&STAGING_EVENTS, &STAGING_SONGS];
pub static INTERMEDIATE_STAGING_TABLES: [&TableSpec; 2] = [&ARTIST_CANDIDATES, &ARTIST_IDENTITIES];
pub static DWH_TABLES: [&TableSpec; 5] = [&SONGPLAYS, &USERS, &SONGS, &ARTISTS, &TIME];

pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    RAW_STAGING_TABLES
        .iter()
        .chain(INTERMEDIATE_STAGING_TABLES.iter())
        .chain(DWH_TABLES.iter())
        .copied()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Drop then recreate every table of one layer.
pub fn recreate_statements(tables: &[&TableSpec], dialect: Dialect) -> Vec<String> {
    let drops = tables.iter().map(|t| t.drop_sql());
    let creates = tables.iter().map(|t| t.create_sql(dialect));
    drops.chain(creates).collect()
}

/// Empty every table of one layer, keeping its definition.
pub fn truncate_statements(tables: &[&TableSpec]) -> Vec<String> {
    tables.iter().map(|t| format!("DELETE FROM {};", t.name)).collect()
}

/// Redshift bulk load from object storage.
pub fn copy_sql(table: &str, source_uri: &str, iam_role: &str, region: &str, json_format: &str) -> String {
    format!(
        "COPY {}\nFROM '{}'\nIAM_ROLE '{}'\nREGION '{}'\nJSON '{}';",
        table, source_uri, iam_role, region, json_format
    )
}
