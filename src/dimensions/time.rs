use crate::schema::{TableSpec, TIME};
use crate::warehouse::{TableRow, Value};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event timestamps arrive as epoch milliseconds, sometimes rendered as a float.
pub fn parse_epoch_ms(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

pub fn start_time(epoch_ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(epoch_ms).map(|dt| dt.naive_utc())
}

/// `yyyymmddhh` as a number.
pub fn time_key(at: &NaiveDateTime) -> i64 {
    i64::from(at.year()) * 1_000_000
        + i64::from(at.month()) * 10_000
        + i64::from(at.day()) * 100
        + i64::from(at.hour())
}

/// Inverse of [`time_key`], returning the start of the hour.
pub fn decompose_time_key(key: i64) -> Option<NaiveDateTime> {
    let hour = u32::try_from(key % 100).ok()?;
    let day = u32::try_from((key / 100) % 100).ok()?;
    let month = u32::try_from((key / 10_000) % 100).ok()?;
    let year = i32::try_from(key / 1_000_000).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRow {
    pub time_key: i64,
    /// Start of the hour bucket
    pub timestamp_date: NaiveDateTime,
    pub hour: u32,
    pub day: u32,
    /// ISO week number
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u32,
    pub day_of_week_name: String,
    pub is_weekend: bool,
}

impl TimeRow {
    pub fn from_epoch_ms(epoch_ms: i64) -> Option<Self> {
        let at = start_time(epoch_ms)?;
        let bucket = at.date().and_hms_opt(at.hour(), 0, 0)?;
        let day_of_week = bucket.weekday().num_days_from_sunday();
        Some(Self {
            time_key: time_key(&bucket),
            timestamp_date: bucket,
            hour: bucket.hour(),
            day: bucket.day(),
            week: bucket.iso_week().week(),
            month: bucket.month(),
            year: bucket.year(),
            day_of_week,
            day_of_week_name: bucket.format("%A").to_string(),
            is_weekend: day_of_week == 0 || day_of_week == 6,
        })
    }
}

impl TableRow for TimeRow {
    fn table() -> &'static TableSpec {
        &TIME
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.time_key.into(),
            self.timestamp_date.format(TIMESTAMP_FORMAT).to_string().into(),
            i64::from(self.hour).into(),
            i64::from(self.day).into(),
            i64::from(self.week).into(),
            i64::from(self.month).into(),
            i64::from(self.year).into(),
            i64::from(self.day_of_week).into(),
            self.day_of_week_name.clone().into(),
            self.is_weekend.into(),
        ]
    }
}
